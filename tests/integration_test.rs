mod node_lifecycle;
mod push_workflow;
