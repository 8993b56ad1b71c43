//! End-to-end dispatch through the local invoker and a real worker thread.

use std::sync::Arc;
use std::time::Duration;

use ghoulcore::Config;
use ghoulcore::ConfigPatch;
use ghoulcore::Error;
use ghoulcore::Payload;
use ghoulcore::commands::OUTPUT_FILE;
use ghoulcore::engine;
use ghoulcore::engine::Engine;
use ghoulcore::engine::Exit;
use ghoulcore::engine::VirtualFs;
use ghoulcore::options::CompressOptions;
use ghoulcore::options::PageList;
use ghoulcore::options::RenderOptions;
use ghoulrun::ContextState;
use ghoulrun::Dispatcher;
use serde_json::Value;
use serde_json::json;

const DOC: &[u8] = b"%PDF-1.7 a document with plenty of bytes to spare";

/// Keeps the first half of every input it was handed.
struct CompactingEngine;

#[async_trait::async_trait]
impl Engine for CompactingEngine {
    async fn run(&self, args: &[String], fs: &mut VirtualFs) -> engine::Result<Exit> {
        let inputs: Vec<Vec<u8>> = args
            .iter()
            .filter_map(|arg| fs.read_file(arg).map(<[u8]>::to_vec))
            .collect();

        if inputs.iter().any(|input| input.starts_with(b"locked")) {
            return Ok(Exit {
                code: 1,
                messages: vec!["This file requires a password for access.".into()],
            });
        }

        let output: Vec<u8> = inputs
            .iter()
            .flat_map(|input| input[..input.len() / 2].to_vec())
            .collect();
        fs.write_file(OUTPUT_FILE, output);

        Ok(Exit {
            code: 0,
            messages: vec![
                "File has 2 pages.".into(),
                "Page 1 MediaBox: [0 0 612 792]".into(),
                "Page 2 MediaBox: [0 0 595 842]".into(),
            ],
        })
    }
}

/// Takes longer than any test is willing to wait.
struct SlowEngine;

#[async_trait::async_trait]
impl Engine for SlowEngine {
    async fn run(&self, _args: &[String], _fs: &mut VirtualFs) -> engine::Result<Exit> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Exit::default())
    }
}

fn doc(data: &[u8]) -> Payload {
    Payload::from(data)
}

fn arg(value: Value) -> Payload {
    Payload::Json(value)
}

fn dispatcher(use_worker: bool) -> Dispatcher {
    Dispatcher::new(
        Arc::new(CompactingEngine),
        Config {
            use_worker,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_local_and_worker_results_match() -> anyhow::Result<()> {
    let local = dispatcher(false);
    let worker = dispatcher(true);

    let calls: Vec<(&str, Vec<Payload>)> = vec![
        ("optimizePDF", vec![doc(DOC)]),
        ("optimizeDoc", vec![doc(DOC), arg(json!({ "pdfSettings": "ebook" }))]),
        ("combinePDF", vec![Payload::from(vec![DOC.to_vec(), DOC.to_vec()])]),
        ("splitPdf", vec![doc(DOC), arg(json!(["1-2", [3, 4]]))]),
        ("addPassword", vec![doc(DOC), arg(json!("secret"))]),
        ("removePassword", vec![doc(DOC), arg(json!("secret"))]),
        ("renderPageAsImage", vec![doc(DOC), arg(json!(2)), arg(json!({ "format": "png" }))]),
        ("getInfo", vec![doc(DOC)]),
        ("isRequirePassword", vec![doc(b"locked document")]),
    ];

    for (name, args) in calls {
        let expected = local.call(name, args.clone()).await?;
        let actual = worker.call(name, args).await?;
        assert_eq!(actual, expected, "{}", name);
    }

    assert_eq!(local.bridge().state(), ContextState::Uninitialized);
    assert_eq!(worker.bridge().contexts_constructed(), 1);
    Ok(())
}

#[tokio::test]
async fn test_errors_match_across_contexts() {
    let local = dispatcher(false);
    let worker = dispatcher(true);

    let cases: Vec<(&str, Vec<Payload>)> = vec![
        ("hasOwnProperty", vec![]),
        ("optimizePDF", vec![]),
        ("optimizePDF", vec![arg(json!("not bytes"))]),
        ("optimizePDF", vec![Payload::from(vec![DOC.to_vec()])]),
        ("isRequirePassword", vec![doc(DOC), arg(json!(1))]),
        ("optimizePDF", vec![doc(b"locked document")]),
    ];

    for (name, args) in cases {
        let expected = local.call(name, args.clone()).await.unwrap_err();
        let actual = worker.call(name, args).await.unwrap_err();
        assert_eq!(actual, expected, "{}", name);
    }

    let err = worker.call("hasOwnProperty", vec![]).await.unwrap_err();
    assert_eq!(err, Error::InvalidCommand { name: "hasOwnProperty".into() });
}

#[tokio::test]
async fn test_local_optimize_doc_shrinks_document() -> anyhow::Result<()> {
    let local = dispatcher(false);

    let output = local.call("optimizeDoc", vec![doc(DOC)]).await?.into_bytes()?;

    assert!(!output.is_empty());
    assert!(output.len() < DOC.len());
    assert_eq!(local.bridge().state(), ContextState::Uninitialized);
    Ok(())
}

#[tokio::test]
async fn test_large_document_round_trips_in_both_contexts() -> anyhow::Result<()> {
    let input: Vec<u8> = (0..4usize << 20).map(|i| (i % 251) as u8).collect();

    for use_worker in [false, true] {
        let router = dispatcher(use_worker);

        let raw = router.call("optimizePDF", vec![Payload::from(input.clone())]).await?;
        assert!(matches!(raw, Payload::Bytes(_)), "worker: {}", use_worker);
        assert_eq!(raw.into_bytes()?, &input[..input.len() / 2]);

        let typed = router.optimize_pdf(&input, &CompressOptions::default()).await?;
        assert_eq!(typed.len(), 2 << 20);
    }
    Ok(())
}

#[tokio::test]
async fn test_optimize_through_worker_shrinks_document() -> anyhow::Result<()> {
    let worker = dispatcher(true);

    let output = worker.optimize_pdf(DOC, &CompressOptions::default()).await?;

    assert!(!output.is_empty());
    assert!(output.len() < DOC.len());
    assert_eq!(output, &DOC[..DOC.len() / 2]);
    Ok(())
}

#[tokio::test]
async fn test_typed_commands_through_worker() -> anyhow::Result<()> {
    let worker = dispatcher(true);

    let info = worker.get_info(DOC, &Default::default()).await?;
    assert_eq!(info.num_pages, 2);
    assert_eq!(info.pages[1].width, 595.0);

    let parts = worker
        .split_pdf(DOC, &[PageList::from("1"), PageList::from("2")], &CompressOptions::default())
        .await?;
    assert_eq!(parts.len(), 2);

    let image = worker.render_page_as_image(DOC, 1, &RenderOptions::default()).await?;
    assert_eq!(image, &DOC[..DOC.len() / 2]);

    assert!(worker.is_require_password(b"locked document").await?);
    assert!(!worker.is_require_password(DOC).await?);
    Ok(())
}

#[tokio::test]
async fn test_use_worker_is_read_per_call() -> anyhow::Result<()> {
    let router = dispatcher(false);

    router.call("getInfo", vec![doc(DOC)]).await?;
    assert_eq!(router.bridge().state(), ContextState::Uninitialized);

    router.configure(&ConfigPatch::default().use_worker(true));
    router.call("getInfo", vec![doc(DOC)]).await?;
    assert_eq!(router.bridge().state(), ContextState::Ready);

    router.configure(&ConfigPatch::default().use_worker(false));
    router.call("getInfo", vec![doc(DOC)]).await?;
    assert_eq!(router.bridge().contexts_constructed(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_worker_calls_share_one_context() -> anyhow::Result<()> {
    let worker = dispatcher(true);

    let mut calls = Vec::new();
    for size in 1..=24usize {
        let worker = worker.clone();
        calls.push(tokio::spawn(async move {
            let input = vec![b'x'; size * 2];
            worker.optimize_pdf(&input, &CompressOptions::default()).await
        }));
    }

    for (size, call) in (1..=24usize).zip(calls) {
        assert_eq!(call.await??.len(), size);
    }
    assert_eq!(worker.bridge().contexts_constructed(), 1);
    Ok(())
}

#[tokio::test]
async fn test_worker_call_times_out() {
    let worker = Dispatcher::new(
        Arc::new(SlowEngine),
        Config {
            use_worker: true,
            request_timeout_ms: Some(50),
            ..Default::default()
        },
    );

    let err = worker.call("isRequirePassword", vec![doc(DOC)]).await.unwrap_err();

    assert_eq!(
        err,
        Error::Timeout {
            name: "isRequirePassword".into(),
            after_ms: 50
        }
    );
    assert_eq!(worker.bridge().state(), ContextState::Ready);
}
