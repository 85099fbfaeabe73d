/// Live Pipeline Test: real FastEmbed models and a local Ollama server
///
/// Run with: cargo test -- --ignored
use pagechat::config::Config;
use pagechat::RagEngine;
use tempfile::TempDir;

#[tokio::test]
#[ignore] // Requires model downloads and a running Ollama server
async fn test_live_upload_and_chat() {
    println!("\n=== Live Pipeline Test ===\n");

    let temp = TempDir::new().unwrap();
    let path = temp.path().join("notes.md");
    std::fs::write(
        &path,
        "Invoices are due within thirty days of delivery.\n\n\
         Late invoices accrue a two percent monthly fee.\x0C\
         Refunds are issued to the original payment method within five business days.",
    )
    .unwrap();

    let engine = tokio::task::spawn_blocking(|| RagEngine::from_config(Config::default()))
        .await
        .unwrap()
        .expect("Failed to load models");
    println!("✓ Models loaded");

    let session_id = engine.new_session_id().await;
    let summary = engine.index_document(&path, &session_id).await.unwrap();
    assert_eq!(summary.page_count, 2);
    println!("✓ Indexed {} chunks", summary.chunk_count);

    let stream = engine
        .chat(&session_id, "When are invoices due?")
        .await
        .unwrap();
    let answer = stream.collect_answer().await.unwrap();
    println!("✓ Answer: {}", answer);
    assert!(!answer.trim().is_empty());

    assert!(engine.delete_session(&session_id).await);
}
