//! End-to-end pipeline runs against an in-process HTTP server and an
//! in-memory object store.

use axum::Router;
use axum::routing::get;
use chrono::{TimeZone, Utc};
use object_store::memory::InMemory;
use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use summaflow_core::{ObjectStoreHandler, ProjectLayout, RunContext, Table};
use summaflow_ml::TrainingPipeline;
use summaflow_ml::pipeline::RUN_MANIFEST_FILE;
use zip::write::SimpleFileOptions;

const MAX_INPUT: usize = 12;
const MAX_TARGET: usize = 5;

fn dataset_zip() -> Vec<u8> {
    let mut csv = String::from("id,dialogue,summary\n");
    for i in 0..10 {
        csv.push_str(&format!(
            "{i},\"Amanda: hi Tom, how are you?\nTom: fine thanks, bye\",Amanda greets Tom\n"
        ));
    }
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        zip.start_file("samsum/README.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"dialogue summarization sample").unwrap();
        zip.start_file("samsum/samsum.csv", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(csv.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf.into_inner()
}

async fn serve_dataset() -> String {
    let body = dataset_zip();
    let app = Router::new().route("/samsum.zip", get(move || async move { body.clone() }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/samsum.zip")
}

fn write_tokenizer(path: &Path) {
    let words = [
        "amanda", "tom", "hi", "how", "are", "you", "fine", "thanks", "bye", "greets",
    ];
    let mut vocab = serde_json::json!({ "<pad>": 0, "<unk>": 1 });
    for (i, w) in words.iter().enumerate() {
        vocab[*w] = serde_json::json!(i + 2);
    }
    let json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 0, "content": "<pad>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 1, "content": "<unk>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": { "type": "Lowercase" },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": { "type": "WordLevel", "vocab": vocab, "unk_token": "<unk>" }
    });
    std::fs::write(path, serde_json::to_string_pretty(&json).unwrap()).unwrap();
}

fn project(root: &Path, url: &str, local: bool, s3: bool) -> ProjectLayout {
    let layout = ProjectLayout::rooted_at(root);
    std::fs::create_dir_all(&layout.config_dir).unwrap();
    let tokenizer = root.join("tokenizer.json");
    write_tokenizer(&tokenizer);

    std::fs::write(
        layout.config_path(),
        format!(
            r#"
data_ingestion:
  source_URL: {url}
  raw_data_filename: samsum.zip
  ingested_data_filename: samsum.csv
  download:
    retries: 2
    delay_secs: 0.0
data_backup:
  local_enabled: {local}
  s3_enabled: {s3}
s3_handler:
  bucket_name: summaflow-test
data_transformation:
  train_filename: train.csv
  val_filename: val.csv
  test_filename: test.csv
"#
        ),
    )
    .unwrap();
    std::fs::write(
        layout.params_path(),
        format!(
            r#"
data_transformation:
  tokenizer:
    pretrained_model_name: {}
    max_input_length: {MAX_INPUT}
    max_target_length: {MAX_TARGET}
    batch_size: 4
  data_split:
    train_size: 0.8
    val_size: 0.1
    test_size: 0.1
    random_state: 42
"#,
            tokenizer.display()
        ),
    )
    .unwrap();
    layout
}

fn run_context() -> RunContext {
    RunContext::at(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap())
}

fn feature_lengths(table: &Table, column: &str) -> Vec<usize> {
    table
        .column_values(column)
        .unwrap()
        .into_iter()
        .map(|cell| serde_json::from_str::<Vec<u32>>(cell).unwrap().len())
        .collect()
}

#[tokio::test]
async fn test_local_and_remote_run_produces_three_tokenized_partitions() {
    let url = serve_dataset().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = project(dir.path(), &url, true, true);
    let run = run_context();

    let logs = layout.run_logs_dir(&run);
    std::fs::create_dir_all(&logs).unwrap();
    std::fs::write(logs.join(format!("{run}.log")), "{\"msg\":\"started\"}\n").unwrap();

    let store = Arc::new(InMemory::new());
    let pipeline = TrainingPipeline::new(run.clone(), layout.clone())
        .unwrap()
        .with_handler(ObjectStoreHandler::with_store("summaflow-test", store.clone()));
    let outcome = pipeline.run().await.unwrap();

    let ingestion = &outcome.ingestion;
    assert!(ingestion.raw_filepath.as_ref().unwrap().is_file());
    assert!(ingestion.dvc_raw_filepath.as_ref().unwrap().is_file());
    assert_eq!(
        ingestion.dvc_raw_filepath.as_deref(),
        Some(layout.dvc_root.join("raw").join("samsum.zip").as_path())
    );
    assert!(layout.dvc_root.join("ingested_data").join("samsum.csv").is_file());
    let ingested = Table::read_csv(ingestion.ingested_filepath.as_ref().unwrap()).unwrap();
    assert_eq!(ingested.row_count(), 10);
    assert!(ingestion.raw_s3_uri.as_ref().unwrap().starts_with("s3://summaflow-test/"));
    assert!(ingestion.dvc_raw_s3_uri.is_some());
    assert!(ingestion.ingested_s3_uri.is_some());

    let transformation = outcome.transformation.expect("transformation artifact");
    let train = Table::read_csv(transformation.train_filepath.as_ref().unwrap()).unwrap();
    let val = Table::read_csv(transformation.val_filepath.as_ref().unwrap()).unwrap();
    let test = Table::read_csv(transformation.test_filepath.as_ref().unwrap()).unwrap();
    assert_eq!(
        (train.row_count(), val.row_count(), test.row_count()),
        (8, 1, 1)
    );
    for table in [&train, &val, &test] {
        assert_eq!(
            &table.columns()[3..],
            &["input_ids", "attention_mask", "labels"]
        );
        assert!(feature_lengths(table, "input_ids").iter().all(|&l| l == MAX_INPUT));
        assert!(feature_lengths(table, "attention_mask").iter().all(|&l| l == MAX_INPUT));
        assert!(feature_lengths(table, "labels").iter().all(|&l| l == MAX_TARGET));
    }

    let mut ids: Vec<String> = [&train, &val, &test]
        .iter()
        .flat_map(|t| t.column_values("id").unwrap())
        .map(str::to_string)
        .collect();
    ids.sort();
    assert_eq!(ids, (0..10).map(|i| i.to_string()).collect::<Vec<_>>());

    let manifest = layout.run_artifacts_dir(&run).join(RUN_MANIFEST_FILE);
    let manifest: serde_yaml::Value =
        serde_yaml::from_str(&std::fs::read_to_string(manifest).unwrap()).unwrap();
    assert_eq!(
        manifest["run"]["timestamp"].as_str(),
        Some("2025_06_01T08_00_00Z")
    );

    let reader = ObjectStoreHandler::with_store("summaflow-test", store);
    let train_uri = transformation.train_s3_uri.as_ref().unwrap();
    assert_eq!(
        train_uri,
        "s3://summaflow-test/artifacts/2025_06_01T08_00_00Z/data_transformation/train.csv"
    );
    assert_eq!(
        ingestion.dvc_raw_s3_uri.as_deref(),
        Some("s3://summaflow-test/data/raw/samsum.zip")
    );
    assert_eq!(reader.load_csv(train_uri).await.unwrap(), train);

    let mirrored_log: serde_json::Value = reader
        .load_object(&format!("s3://summaflow-test/logs/{run}/{run}.log"))
        .await
        .unwrap();
    assert_eq!(mirrored_log["msg"], "started");
}

#[tokio::test]
async fn test_remote_only_run_reads_ingested_data_back_from_store() {
    let url = serve_dataset().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = project(dir.path(), &url, false, true);
    let run = run_context();

    let store = Arc::new(InMemory::new());
    let pipeline = TrainingPipeline::new(run.clone(), layout.clone())
        .unwrap()
        .with_handler(ObjectStoreHandler::with_store("summaflow-test", store.clone()));
    let outcome = pipeline.run().await.unwrap();

    assert!(outcome.ingestion.ingested_filepath.is_none());
    assert!(outcome.ingestion.dvc_raw_filepath.is_none());
    assert!(!layout.dvc_root.join("raw").join("samsum.zip").exists());

    let transformation = outcome.transformation.unwrap();
    assert!(transformation.train_filepath.is_none());

    let reader = ObjectStoreHandler::with_store("summaflow-test", store);
    let train = reader
        .load_csv(transformation.train_s3_uri.as_ref().unwrap())
        .await
        .unwrap();
    let val = reader
        .load_csv(transformation.val_s3_uri.as_ref().unwrap())
        .await
        .unwrap();
    let test = reader
        .load_csv(transformation.test_s3_uri.as_ref().unwrap())
        .await
        .unwrap();
    assert_eq!(
        (train.row_count(), val.row_count(), test.row_count()),
        (8, 1, 1)
    );
    assert!(feature_lengths(&train, "labels").iter().all(|&l| l == MAX_TARGET));
    assert!(outcome.ingestion.dvc_raw_s3_uri.is_some());
}

#[tokio::test]
async fn test_both_legs_disabled_skips_transformation() {
    let url = serve_dataset().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = project(dir.path(), &url, false, false);

    let pipeline = TrainingPipeline::new(run_context(), layout.clone()).unwrap();
    let outcome = pipeline.run().await.unwrap();

    assert_eq!(outcome.ingestion, Default::default());
    assert!(outcome.transformation.is_none());
    assert!(
        layout
            .run_artifacts_dir(&run_context())
            .join(RUN_MANIFEST_FILE)
            .is_file()
    );
}

#[tokio::test]
async fn test_second_ingest_skips_existing_download() {
    let url = serve_dataset().await;
    let dir = tempfile::tempdir().unwrap();
    let layout = project(dir.path(), &url, true, false);

    let pipeline = TrainingPipeline::new(run_context(), layout.clone()).unwrap();
    let first = pipeline.ingest().await.unwrap();
    let raw = first.raw_filepath.clone().unwrap();
    let modified = std::fs::metadata(&raw).unwrap().modified().unwrap();

    let second = pipeline.ingest().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(std::fs::metadata(&raw).unwrap().modified().unwrap(), modified);
}
