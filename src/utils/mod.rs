pub mod async_task;

pub mod file_io;

pub mod net;

#[cfg(test)]
mod async_task_test;
#[cfg(test)]
mod utils_test;
