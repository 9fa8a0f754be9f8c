use mockito::{Matcher, Mock, Server, ServerGuard};
use ollama_bench::{BenchmarkOptions, BenchmarkRunner, CSV_HEADER, ModelCheck};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CREATED_AT: &str = "2024-05-01T10:00:00.123456Z";

fn write_config(dir: &TempDir, yaml: &str) -> PathBuf {
    let path = dir.path().join("benchmark.yml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn options(server: &ServerGuard, dir: &TempDir, config: PathBuf) -> BenchmarkOptions {
    BenchmarkOptions {
        server: server.url(),
        config,
        output: dir.path().join("results.csv"),
        repeat: 1,
        skip_unloading: true,
        model_check: ModelCheck::Tags,
        timeout: None,
    }
}

fn generate_body(model: &str, eval_duration: u64) -> String {
    json!({
        "model": model,
        "created_at": CREATED_AT,
        "response": "Hello! How can I help you today?",
        "done": true,
        "done_reason": "stop",
        "context": [1, 2, 3],
        "total_duration": 2000000000u64,
        "load_duration": 500000000u64,
        "prompt_eval_count": 10,
        "prompt_eval_duration": 200000000u64,
        "eval_count": 50,
        "eval_duration": eval_duration
    })
    .to_string()
}

async fn mock_version(server: &mut ServerGuard, hits: usize) -> Mock {
    server
        .mock("GET", "/api/version")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"version":"0.5.1"}"#)
        .expect(hits)
        .create_async()
        .await
}

async fn mock_models(server: &mut ServerGuard, path: &str, names: &[&str], hits: usize) -> Mock {
    let models: Vec<_> = names
        .iter()
        .map(|name| json!({"name": name, "model": name, "size": 4661224676u64}))
        .collect();
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "models": models }).to_string())
        .expect(hits)
        .create_async()
        .await
}

async fn mock_generate(
    server: &mut ServerGuard,
    model: &str,
    prompt: &str,
    eval_duration: u64,
    hits: usize,
) -> Mock {
    server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "keep_alive": 0
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(generate_body(model, eval_duration))
        .expect(hits)
        .create_async()
        .await
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[tokio::test]
async fn test_single_model_single_prompt() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "models:\n  - llama3\nprompts:\n  - hello\n");

    let version = mock_version(&mut server, 1).await;
    let tags = mock_models(&mut server, "/api/tags", &["llama3"], 1).await;
    let generate = mock_generate(&mut server, "llama3", "hello", 1_000_000_000, 1).await;

    let opts = options(&server, &dir, config);
    let output = opts.output.clone();
    let runner = BenchmarkRunner::new(opts).unwrap();
    let results = runner.run().await.unwrap();

    version.assert_async().await;
    tags.assert_async().await;
    generate.assert_async().await;

    assert_eq!(results.server_version, "0.5.1");
    assert_eq!(results.table.len(), 1);

    let record = &results.table.records()[0];
    assert_eq!(record.total_duration, 2.0);
    assert_eq!(record.load_duration, 0.5);
    assert_eq!(record.eval_duration, 1.0);
    assert_eq!(record.eval_rate, 50.0);
    assert_eq!(record.prompt_eval_rate, 50.0);

    let rows = read_rows(&output);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], CSV_HEADER.to_vec());
    assert_eq!(
        rows[1],
        vec!["llama3", "hello", CREATED_AT, "2.0", "0.5", "1.0", "50.0"]
    );
}

#[tokio::test]
async fn test_row_count_and_order() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        &dir,
        "models:\n  - llama3\n  - mistral\nprompts:\n  - hello\n  - why is the sky blue?\n",
    );

    let _version = mock_version(&mut server, 1).await;
    let _tags = mock_models(&mut server, "/api/tags", &["mistral", "llama3", "phi3"], 1).await;
    let mut generates = Vec::new();
    for model in ["llama3", "mistral"] {
        for prompt in ["hello", "why is the sky blue?"] {
            generates.push(mock_generate(&mut server, model, prompt, 1_000_000_000, 3).await);
        }
    }

    let mut opts = options(&server, &dir, config);
    opts.repeat = 3;
    let output = opts.output.clone();
    let results = BenchmarkRunner::new(opts).unwrap().run().await.unwrap();

    for generate in &generates {
        generate.assert_async().await;
    }
    assert_eq!(results.table.len(), 12);

    let rows = read_rows(&output);
    assert_eq!(rows.len(), 13);
    let order: Vec<(&str, &str)> = rows[1..]
        .iter()
        .map(|row| (row[0].as_str(), row[1].as_str()))
        .collect();
    let one_pass = [
        ("llama3", "hello"),
        ("llama3", "why is the sky blue?"),
        ("mistral", "hello"),
        ("mistral", "why is the sky blue?"),
    ];
    assert_eq!(order, one_pass.repeat(3));
}

#[tokio::test]
async fn test_missing_model_fails_before_generate() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "models:\n  - llama3\n  - ghost-model\nprompts:\n  - hello\n");

    let _version = mock_version(&mut server, 1).await;
    let _tags = mock_models(&mut server, "/api/tags", &["llama3"], 1).await;
    let generate = mock_generate(&mut server, "llama3", "hello", 1_000_000_000, 0).await;

    let opts = options(&server, &dir, config);
    let output = opts.output.clone();
    let err = BenchmarkRunner::new(opts)
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "model_not_available");
    assert!(err.to_string().contains("ghost-model"));
    generate.assert_async().await;
    assert!(!output.exists());
}

#[tokio::test]
async fn test_invalid_config_makes_no_requests() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "models:\n  - llama3\nprompts: []\n");

    let version = mock_version(&mut server, 0).await;

    let err = BenchmarkRunner::new(options(&server, &dir, config))
        .err()
        .unwrap();

    assert_eq!(err.kind(), "config");
    version.assert_async().await;
}

#[tokio::test]
async fn test_unloads_running_models() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "models:\n  - llama3\nprompts:\n  - hello\n");

    let _version = mock_version(&mut server, 1).await;
    let _tags = mock_models(&mut server, "/api/tags", &["llama3", "mistral"], 1).await;
    let ps = mock_models(&mut server, "/api/ps", &["mistral"], 1).await;
    let unload = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::Json(json!({
            "model": "mistral",
            "stream": false,
            "keep_alive": 0
        })))
        .with_status(200)
        .with_body(r#"{"model":"mistral","created_at":"2024-05-01T10:00:00Z","response":"","done":true,"done_reason":"unload"}"#)
        .expect(1)
        .create_async()
        .await;
    let generate = mock_generate(&mut server, "llama3", "hello", 1_000_000_000, 1).await;

    let mut opts = options(&server, &dir, config);
    opts.skip_unloading = false;
    BenchmarkRunner::new(opts).unwrap().run().await.unwrap();

    ps.assert_async().await;
    unload.assert_async().await;
    generate.assert_async().await;
}

#[tokio::test]
async fn test_skip_unloading_does_not_query_running_models() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "models:\n  - llama3\nprompts:\n  - hello\n");

    let _version = mock_version(&mut server, 1).await;
    let _tags = mock_models(&mut server, "/api/tags", &["llama3"], 1).await;
    let ps = mock_models(&mut server, "/api/ps", &["llama3"], 0).await;
    let _generate = mock_generate(&mut server, "llama3", "hello", 1_000_000_000, 1).await;

    BenchmarkRunner::new(options(&server, &dir, config))
        .unwrap()
        .run()
        .await
        .unwrap();

    ps.assert_async().await;
}

#[tokio::test]
async fn test_running_models_failure_is_fatal() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "models:\n  - llama3\nprompts:\n  - hello\n");

    let _version = mock_version(&mut server, 1).await;
    let _tags = mock_models(&mut server, "/api/tags", &["llama3"], 1).await;
    let ps = server
        .mock("GET", "/api/ps")
        .with_status(500)
        .with_body("internal error")
        .expect(1)
        .create_async()
        .await;
    let generate = server
        .mock("POST", "/api/generate")
        .expect(0)
        .create_async()
        .await;

    let mut opts = options(&server, &dir, config);
    opts.skip_unloading = false;
    let output = opts.output.clone();
    let err = BenchmarkRunner::new(opts).unwrap().run().await.unwrap_err();

    assert_eq!(err.kind(), "connectivity");
    ps.assert_async().await;
    generate.assert_async().await;
    assert!(!output.exists());
}

#[tokio::test]
async fn test_unload_request_failure_is_fatal() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "models:\n  - llama3\nprompts:\n  - hello\n");

    let _version = mock_version(&mut server, 1).await;
    let _tags = mock_models(&mut server, "/api/tags", &["llama3", "mistral"], 1).await;
    let _ps = mock_models(&mut server, "/api/ps", &["mistral"], 1).await;
    let unload = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::Json(json!({
            "model": "mistral",
            "stream": false,
            "keep_alive": 0
        })))
        .with_status(500)
        .with_body("internal error")
        .expect(1)
        .create_async()
        .await;
    let generate = mock_generate(&mut server, "llama3", "hello", 1_000_000_000, 0).await;

    let mut opts = options(&server, &dir, config);
    opts.skip_unloading = false;
    let output = opts.output.clone();
    let err = BenchmarkRunner::new(opts).unwrap().run().await.unwrap_err();

    assert_eq!(err.kind(), "connectivity");
    unload.assert_async().await;
    generate.assert_async().await;
    assert!(!output.exists());
}

#[tokio::test]
async fn test_model_list_failure_is_fatal() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "models:\n  - llama3\nprompts:\n  - hello\n");

    let _version = mock_version(&mut server, 1).await;
    let tags = server
        .mock("GET", "/api/tags")
        .with_status(500)
        .with_body("internal error")
        .expect(1)
        .create_async()
        .await;
    let generate = server
        .mock("POST", "/api/generate")
        .expect(0)
        .create_async()
        .await;

    let opts = options(&server, &dir, config);
    let output = opts.output.clone();
    let err = BenchmarkRunner::new(opts).unwrap().run().await.unwrap_err();

    assert_eq!(err.kind(), "connectivity");
    tags.assert_async().await;
    generate.assert_async().await;
    assert!(!output.exists());
}

#[tokio::test]
async fn test_zero_eval_duration_is_parse_error() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "models:\n  - llama3\nprompts:\n  - hello\n");

    let _version = mock_version(&mut server, 1).await;
    let _tags = mock_models(&mut server, "/api/tags", &["llama3"], 1).await;
    let _generate = mock_generate(&mut server, "llama3", "hello", 0, 1).await;

    let opts = options(&server, &dir, config);
    let output = opts.output.clone();
    let err = BenchmarkRunner::new(opts)
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "parse");
    assert!(!output.exists());
}

#[tokio::test]
async fn test_malformed_response_is_parse_error() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "models:\n  - llama3\nprompts:\n  - hello\n");

    let _version = mock_version(&mut server, 1).await;
    let _tags = mock_models(&mut server, "/api/tags", &["llama3"], 1).await;
    let _generate = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(r#"{"model":"llama3","created_at":"2024-05-01T10:00:00Z","done":true}"#)
        .create_async()
        .await;

    let err = BenchmarkRunner::new(options(&server, &dir, config))
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "parse");
}

#[tokio::test]
async fn test_failed_generate_aborts_run() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "models:\n  - llama3\nprompts:\n  - hello\n  - bye\n");

    let _version = mock_version(&mut server, 1).await;
    let _tags = mock_models(&mut server, "/api/tags", &["llama3"], 1).await;
    let _first = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(json!({"prompt": "hello"})))
        .with_status(500)
        .with_body(r#"{"error":"model runner has unexpectedly stopped"}"#)
        .expect(1)
        .create_async()
        .await;
    let second = mock_generate(&mut server, "llama3", "bye", 1_000_000_000, 0).await;

    let opts = options(&server, &dir, config);
    let output = opts.output.clone();
    let err = BenchmarkRunner::new(opts)
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "request");
    second.assert_async().await;
    assert!(!output.exists());
}

#[tokio::test]
async fn test_version_failure_is_connectivity_error() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "models:\n  - llama3\nprompts:\n  - hello\n");

    let _version = server
        .mock("GET", "/api/version")
        .with_status(502)
        .create_async()
        .await;
    let tags = mock_models(&mut server, "/api/tags", &["llama3"], 0).await;

    let err = BenchmarkRunner::new(options(&server, &dir, config))
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "connectivity");
    tags.assert_async().await;
}

#[tokio::test]
async fn test_show_model_check() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, "models:\n  - llama3\n  - ghost-model\nprompts:\n  - hello\n");

    let _version = mock_version(&mut server, 1).await;
    let tags = mock_models(&mut server, "/api/tags", &["llama3"], 0).await;
    let _found = server
        .mock("POST", "/api/show")
        .match_body(Matcher::Json(json!({"model": "llama3", "verbose": false})))
        .with_status(200)
        .with_body(r#"{"modelfile":"FROM llama3"}"#)
        .expect(1)
        .create_async()
        .await;
    let _missing = server
        .mock("POST", "/api/show")
        .match_body(Matcher::Json(json!({"model": "ghost-model", "verbose": false})))
        .with_status(404)
        .with_body(r#"{"error":"model 'ghost-model' not found"}"#)
        .expect(1)
        .create_async()
        .await;

    let mut opts = options(&server, &dir, config);
    opts.model_check = ModelCheck::Show;
    let err = BenchmarkRunner::new(opts)
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "model_not_available");
    tags.assert_async().await;
}
