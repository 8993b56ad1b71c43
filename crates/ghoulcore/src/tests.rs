//! Tests for the command registry with a scripted engine.

use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use serde_json::json;

use crate::commands::OUTPUT_FILE;
use crate::config::Config;
use crate::engine;
use crate::engine::Engine;
use crate::engine::EngineError;
use crate::engine::Exit;
use crate::engine::VirtualFs;
use crate::error::Error;
use crate::payload::Payload;
use crate::registry::CommandName;
use crate::registry::Invoker;
use crate::registry::LocalInvoker;
use crate::registry::Registry;

/// Engine that records every run and answers from a script.
#[derive(Default)]
struct ScriptedEngine {
    runs: Mutex<Vec<(Vec<String>, Vec<String>)>>,
    exit: Exit,
    output: Option<Vec<u8>>,
}

impl ScriptedEngine {
    fn writing(output: &[u8]) -> Self {
        Self {
            output: Some(output.to_vec()),
            ..Default::default()
        }
    }

    fn printing(code: i32, messages: &[&str]) -> Self {
        Self {
            exit: Exit {
                code,
                messages: messages.iter().map(|m| m.to_string()).collect(),
            },
            ..Default::default()
        }
    }

    fn last_args(&self) -> Vec<String> {
        self.runs.lock().unwrap().last().map(|(args, _)| args.clone()).unwrap_or_default()
    }

    fn last_files(&self) -> Vec<String> {
        self.runs.lock().unwrap().last().map(|(_, files)| files.clone()).unwrap_or_default()
    }

    fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Engine for ScriptedEngine {
    async fn run(&self, args: &[String], fs: &mut VirtualFs) -> engine::Result<Exit> {
        let files = fs.iter().map(|(path, _)| path.to_string()).collect();
        self.runs.lock().unwrap().push((args.to_vec(), files));
        if let Some(output) = &self.output {
            fs.write_file(OUTPUT_FILE, output.clone());
        }
        Ok(self.exit.clone())
    }
}

struct BrokenEngine;

#[async_trait::async_trait]
impl Engine for BrokenEngine {
    async fn run(&self, _args: &[String], _fs: &mut VirtualFs) -> engine::Result<Exit> {
        Err(EngineError::Spawn("gs: not found".into()))
    }
}

fn registry(engine: Arc<ScriptedEngine>) -> Registry {
    Registry::new(engine)
}

fn bytes(data: &[u8]) -> Payload {
    Payload::from(data)
}

fn arg(value: Value) -> Payload {
    Payload::Json(value)
}

#[test]
fn test_command_names_are_closed() {
    for command in CommandName::ALL {
        assert_eq!(command.as_str().parse::<CommandName>().unwrap(), command);
    }
    assert_eq!("optimizeDoc".parse::<CommandName>().unwrap(), CommandName::OptimizePdf);
    assert_eq!(
        "toString".parse::<CommandName>().unwrap_err(),
        Error::InvalidCommand { name: "toString".into() }
    );
}

#[tokio::test]
async fn test_invoke_rejects_unknown_name() {
    let engine = Arc::new(ScriptedEngine::writing(b"out"));
    let registry = registry(engine.clone());

    assert!(!registry.has("constructor"));
    let err = registry.invoke("constructor", vec![], &Config::default()).await.unwrap_err();

    assert_eq!(err, Error::InvalidCommand { name: "constructor".into() });
    assert_eq!(engine.run_count(), 0, "engine must not run for an invalid name");
}

#[tokio::test]
async fn test_invoke_optimize_builds_pdfwrite_args() {
    let engine = Arc::new(ScriptedEngine::writing(b"small"));
    let registry = registry(engine.clone());

    let result = registry
        .invoke("optimizePDF", vec![bytes(b"%PDF-1.7 big")], &Config::default())
        .await
        .unwrap();

    assert_eq!(result, bytes(b"small"));
    assert_eq!(
        engine.last_args(),
        vec![
            "-dQUIET",
            "-dNOPAUSE",
            "-dBATCH",
            "-dSAFER",
            "-sDEVICE=pdfwrite",
            "-dNOTRANSPARENCY",
            "-dCompatibilityLevel=1.4",
            "-sColorConversionStrategy=RGB",
            "-dPDFSETTINGS=/screen",
            "-dFastWebView=true",
            "-sOutputFile=./output",
            "./input-0",
        ]
    );
    assert_eq!(engine.last_files(), vec!["./input-0"]);
}

#[tokio::test]
async fn test_resource_base_is_passed_to_engine() {
    let engine = Arc::new(ScriptedEngine::writing(b"out"));
    let registry = registry(engine.clone());
    let config = Config {
        resource_base: Some("/opt/gs/Resource".into()),
        ..Default::default()
    };

    registry.invoke("optimizePDF", vec![bytes(b"in")], &config).await.unwrap();

    assert!(engine.last_args().contains(&"-I/opt/gs/Resource".to_string()));
}

#[tokio::test]
async fn test_combine_stages_every_input() {
    let engine = Arc::new(ScriptedEngine::writing(b"merged"));
    let registry = registry(engine.clone());

    registry
        .invoke(
            "combinePDF",
            vec![
                Payload::from(vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]),
                arg(json!({"pdfSettings": "printer"})),
            ],
            &Config::default(),
        )
        .await
        .unwrap();

    let args = engine.last_args();
    assert!(args.contains(&"-dPDFSETTINGS=/printer".to_string()));
    assert_eq!(&args[args.len() - 3..], ["./input-0", "./input-1", "./input-2"]);
    assert_eq!(engine.last_files(), vec!["./input-0", "./input-1", "./input-2"]);
}

#[tokio::test]
async fn test_split_runs_once_per_page_list() {
    let engine = Arc::new(ScriptedEngine::writing(b"part"));
    let registry = registry(engine.clone());

    let result = registry
        .invoke("splitPdf", vec![bytes(b"doc"), arg(json!(["1-3", [[4, 10]]]))], &Config::default())
        .await
        .unwrap();

    let parts = result.into_bytes_list().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(engine.run_count(), 2);
    assert!(engine.last_args().contains(&"-sPageList=4-10".to_string()));
}

#[tokio::test]
async fn test_add_password_defaults_owner_to_user() {
    let engine = Arc::new(ScriptedEngine::writing(b"locked"));
    let registry = registry(engine.clone());

    registry
        .invoke("addPassword", vec![bytes(b"doc"), arg(json!("hunter2"))], &Config::default())
        .await
        .unwrap();

    let args = engine.last_args();
    assert!(args.contains(&"-sUserPassword=hunter2".to_string()));
    assert!(args.contains(&"-sOwnerPassword=hunter2".to_string()));
}

#[tokio::test]
async fn test_remove_password_does_not_reapply() {
    let engine = Arc::new(ScriptedEngine::writing(b"open"));
    let registry = registry(engine.clone());

    registry
        .invoke("removePassword", vec![bytes(b"doc"), arg(json!("123456"))], &Config::default())
        .await
        .unwrap();

    let args = engine.last_args();
    assert!(args.contains(&"-sPDFPassword=123456".to_string()));
    assert!(!args.iter().any(|a| a.starts_with("-sUserPassword")));
}

#[tokio::test]
async fn test_render_defaults_to_first_page_jpeg() {
    let engine = Arc::new(ScriptedEngine::writing(b"\xff\xd8"));
    let registry = registry(engine.clone());

    registry
        .invoke("renderPageAsImage", vec![bytes(b"doc")], &Config::default())
        .await
        .unwrap();

    let args = engine.last_args();
    assert!(args.contains(&"-sDEVICE=jpeg".to_string()));
    assert!(args.contains(&"-sPageList=1".to_string()));
    assert!(args.contains(&"-r96".to_string()));
    assert_eq!(args.last().map(String::as_str), Some("./input"));
}

#[tokio::test]
async fn test_render_png_page() {
    let engine = Arc::new(ScriptedEngine::writing(b"\x89PNG"));
    let registry = registry(engine.clone());

    registry
        .invoke(
            "renderPageAsImage",
            vec![bytes(b"doc"), arg(json!(3)), arg(json!({"format": "png", "resolution": 150}))],
            &Config::default(),
        )
        .await
        .unwrap();

    let args = engine.last_args();
    assert!(args.contains(&"-sDEVICE=png16m".to_string()));
    assert!(args.contains(&"-sPageList=3".to_string()));
    assert!(args.contains(&"-r150".to_string()));
}

#[tokio::test]
async fn test_get_info_parses_engine_messages() {
    let engine = Arc::new(ScriptedEngine::printing(
        0,
        &["File has 2 pages.", "Page 1 MediaBox: [0 0 595 842]", "Page 2 MediaBox: [0 0 842 595]"],
    ));
    let registry = registry(engine.clone());

    let info: Value = registry
        .invoke("getInfo", vec![bytes(b"doc"), arg(json!({"password": "pw"}))], &Config::default())
        .await
        .unwrap()
        .decode()
        .unwrap();

    assert_eq!(info["numPages"], json!(2));
    assert_eq!(info["pages"][1]["width"], json!(842.0));

    let args = engine.last_args();
    assert!(args.contains(&"-dNODISPLAY".to_string()));
    assert!(args.contains(&"-dPDFINFO".to_string()));
    assert_eq!(&args[args.len() - 2..], ["-sPDFPassword=pw", "./input"]);
}

#[tokio::test]
async fn test_is_require_password() {
    let locked = registry(Arc::new(ScriptedEngine::printing(
        1,
        &["This file requires a password for access."],
    )));
    let open = registry(Arc::new(ScriptedEngine::printing(0, &[])));
    let config = Config::default();

    let locked = locked.invoke("isRequirePassword", vec![bytes(b"doc")], &config).await.unwrap();
    let open = open.invoke("isRequirePassword", vec![bytes(b"doc")], &config).await.unwrap();

    assert_eq!(locked, arg(json!(true)));
    assert_eq!(open, arg(json!(false)));
}

#[tokio::test]
async fn test_missing_output_is_command_failure() {
    let engine = Arc::new(ScriptedEngine::printing(1, &["Error: /undefined in --run--"]));
    let registry = registry(engine);

    let err = registry
        .invoke("optimizePDF", vec![bytes(b"not a pdf")], &Config::default())
        .await
        .unwrap_err();

    let Error::CommandFailure(failure) = err else {
        panic!("expected CommandFailure, got {:?}", err);
    };
    assert_eq!(failure.exit_code, Some(1));
    assert!(failure.message.contains("/undefined"));
}

#[tokio::test]
async fn test_output_wins_over_nonzero_exit() {
    let engine = Arc::new(ScriptedEngine {
        output: Some(b"small".to_vec()),
        exit: Exit {
            code: 1,
            messages: vec!["**** Warning: repaired a damaged xref table".into()],
        },
        ..Default::default()
    });
    let registry = registry(engine);

    let result = registry
        .invoke("optimizePDF", vec![bytes(b"%PDF-1.4 damaged")], &Config::default())
        .await
        .unwrap();

    assert_eq!(result.into_bytes().unwrap(), b"small");
}

#[tokio::test]
async fn test_get_info_keeps_what_a_failed_run_printed() {
    let engine = Arc::new(ScriptedEngine::printing(
        1,
        &["File has 3 pages.", "Page 1 MediaBox: [0 0 612 792]", "Error: /syntaxerror in --token--"],
    ));
    let registry = registry(engine);

    let info: Value = registry
        .invoke("getInfo", vec![bytes(b"doc")], &Config::default())
        .await
        .unwrap()
        .decode()
        .unwrap();

    assert_eq!(info["numPages"], json!(3));
    assert_eq!(info["pages"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_json_byte_arrays_are_accepted_as_documents() {
    let engine = Arc::new(ScriptedEngine::writing(b"out"));
    let registry = registry(engine.clone());

    registry
        .invoke("optimizePDF", vec![arg(json!(b"doc"))], &Config::default())
        .await
        .unwrap();

    assert_eq!(engine.run_count(), 1);
}

#[tokio::test]
async fn test_engine_error_passes_through_as_failure() {
    let registry = Registry::new(Arc::new(BrokenEngine));

    let err = registry
        .invoke("optimizePDF", vec![bytes(b"doc")], &Config::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CommandFailure(ref f) if f.message.contains("gs: not found")));
}

#[tokio::test]
async fn test_argument_validation() {
    let engine = Arc::new(ScriptedEngine::writing(b"out"));
    let registry = registry(engine.clone());
    let config = Config::default();

    let missing = registry.invoke("removePassword", vec![bytes(b"doc")], &config).await.unwrap_err();
    assert!(matches!(missing, Error::InvalidArguments { ref reason, .. } if reason.contains("missing argument 2")));

    let wrong_type = registry.invoke("optimizePDF", vec![arg(json!("nope"))], &config).await.unwrap_err();
    assert!(matches!(wrong_type, Error::InvalidArguments { ref name, .. } if name == "optimizePDF"));

    let extra = registry
        .invoke("isRequirePassword", vec![bytes(b"doc"), arg(json!(1))], &config)
        .await
        .unwrap_err();
    assert!(matches!(extra, Error::InvalidArguments { .. }));

    assert_eq!(engine.run_count(), 0);
}

#[tokio::test]
async fn test_null_optional_arguments_use_defaults() {
    let engine = Arc::new(ScriptedEngine::writing(b"out"));
    let registry = registry(engine.clone());

    registry
        .invoke("optimizePDF", vec![bytes(b"doc"), Payload::null()], &Config::default())
        .await
        .unwrap();

    assert!(engine.last_args().contains(&"-dPDFSETTINGS=/screen".to_string()));
}

#[tokio::test]
async fn test_local_invoker_is_a_passthrough() {
    let engine = Arc::new(ScriptedEngine::writing(b"out"));
    let invoker = LocalInvoker::new(Arc::new(registry(engine)));

    let via_invoker = invoker
        .invoke("optimizeDoc", vec![bytes(b"doc")], Arc::new(Config::default()))
        .await
        .unwrap();
    let direct = invoker
        .registry()
        .invoke("optimizeDoc", vec![bytes(b"doc")], &Config::default())
        .await
        .unwrap();

    assert_eq!(via_invoker, direct);
}

#[test]
fn test_errors_survive_serialization() {
    let errors = vec![
        Error::InvalidCommand { name: "x".into() },
        Error::CommandFailure(crate::Failure::exited(2, "boom")),
        Error::channel_fault("worker exited"),
        Error::Timeout { name: "getInfo".into(), after_ms: 5 },
    ];

    for err in errors {
        let wire = serde_json::to_value(&err).unwrap();
        assert_eq!(wire["kind"], json!(err.kind()));
        let back: Error = serde_json::from_value(wire).unwrap();
        assert_eq!(back, err);
    }
}
