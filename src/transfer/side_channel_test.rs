use tokio::io::AsyncWriteExt;

use crate::transfer::CaptureBuffer;
use crate::transfer::SideChannelReader;

#[tokio::test]
async fn test_reader_captures_labelled_lines() {
    let capture = CaptureBuffer::new(16);
    let reader = SideChannelReader::spawn(
        "t1".to_string(),
        "send/err",
        &b"full stream estimate\n1024 bytes sent\n"[..],
        capture.clone(),
    );
    reader.join().await.unwrap();

    assert_eq!(
        capture.snapshot(),
        vec![
            "send/err: full stream estimate".to_string(),
            "send/err: 1024 bytes sent".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_reader_finishes_on_eof() {
    let capture = CaptureBuffer::new(16);
    let reader = SideChannelReader::spawn("t1".to_string(), "recv/out", &b""[..], capture.clone());
    reader.join().await.unwrap();

    assert!(capture.snapshot().is_empty());
}

#[tokio::test]
async fn test_capture_evicts_oldest_lines_and_counts_them() {
    let capture = CaptureBuffer::new(2);
    let (mut tx, rx) = tokio::io::duplex(256);
    let reader = SideChannelReader::spawn("t1".to_string(), "recv/err", rx, capture.clone());

    for i in 0..5 {
        tx.write_all(format!("line {i}\n").as_bytes()).await.unwrap();
    }
    drop(tx);
    reader.join().await.unwrap();

    assert_eq!(
        capture.snapshot(),
        vec![
            "(3 earlier lines dropped)".to_string(),
            "recv/err: line 3".to_string(),
            "recv/err: line 4".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_capture_is_shared_between_readers() {
    let capture = CaptureBuffer::new(16);
    let first = SideChannelReader::spawn(
        "t1".to_string(),
        "send/err",
        &b"producer says hi\n"[..],
        capture.clone(),
    );
    let second = SideChannelReader::spawn(
        "t1".to_string(),
        "recv/err",
        &b"consumer says hi\n"[..],
        capture.clone(),
    );
    first.join().await.unwrap();
    second.join().await.unwrap();

    let lines = capture.snapshot();
    assert_eq!(lines.len(), 2);
    assert!(lines.contains(&"send/err: producer says hi".to_string()));
    assert!(lines.contains(&"recv/err: consumer says hi".to_string()));
}
