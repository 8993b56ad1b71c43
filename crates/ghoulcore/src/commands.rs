//! # Document Commands
//!
//! Each command translates its typed arguments into an engine argument
//! vector, stages inputs in a fresh `VirtualFs`, runs the engine once per
//! output, and reads the result back from `./output`.

use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::engine::Engine;
use crate::engine::Exit;
use crate::engine::VirtualFs;
use crate::error::Failure;
use crate::error::Result;
use crate::options::CompressOptions;
use crate::options::Info;
use crate::options::InfoOptions;
use crate::options::PageList;
use crate::options::RenderOptions;

pub const INPUT_FILE: &str = "./input";
pub const OUTPUT_FILE: &str = "./output";

/// Leading flags shared by every engine invocation.
fn prelude(config: &Config, display: bool) -> Vec<String> {
    let mut args: Vec<String> = vec!["-dQUIET".into(), "-dNOPAUSE".into()];
    if !display {
        args.push("-dNODISPLAY".into());
    }
    args.push("-dBATCH".into());
    args.push("-dSAFER".into());
    if let Some(base) = &config.resource_base {
        args.push(format!("-I{}", base));
    }
    args
}

fn input_name(index: usize) -> String {
    format!("./input-{}", index)
}

/// Full argument vector for a `pdfwrite` run over `inputs`.
pub fn pdfwrite_args(config: &Config, options: &CompressOptions, inputs: &[String]) -> Vec<String> {
    let mut args = prelude(config, true);
    args.push("-sDEVICE=pdfwrite".into());
    args.extend(options.to_args());
    args.push(format!("-sOutputFile={}", OUTPUT_FILE));
    args.extend(inputs.iter().cloned());
    args
}

/// Full argument vector for rasterizing one page.
pub fn render_args(config: &Config, page_number: u32, options: &RenderOptions) -> Vec<String> {
    let mut args = prelude(config, true);
    args.extend([
        format!("-sDEVICE={}", options.format.device()),
        format!("-sPageList={}", page_number),
        format!("-r{}", options.resolution),
        format!("-dTextAlphaBits={}", options.text_alpha_bits),
        format!("-dGraphicsAlphaBits={}", options.graphics_alpha_bits),
        format!("-sOutputFile={}", OUTPUT_FILE),
        INPUT_FILE.to_string(),
    ]);
    args
}

/// Full argument vector for extracting page metadata.
pub fn info_args(config: &Config, options: &InfoOptions) -> Vec<String> {
    let mut args = prelude(config, false);
    args.push("-dPDFINFO".into());
    if let Some(password) = &options.password {
        args.push(format!("-sPDFPassword={}", password));
    }
    args.push(INPUT_FILE.to_string());
    args
}

fn failure_from(exit: &Exit, what: &str) -> Failure {
    let detail = exit
        .messages
        .iter()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| format!("{}: {}", what, line.trim()))
        .unwrap_or_else(|| what.to_string());
    Failure::exited(exit.code, detail)
}

/// The commands, bound to one engine.
#[derive(Clone)]
pub struct Commands {
    engine: Arc<dyn Engine>,
}

impl Commands {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    async fn run(&self, args: &[String], fs: &mut VirtualFs) -> Result<Exit> {
        debug!(args = ?args, "invoking engine");
        let exit = self
            .engine
            .run(args, fs)
            .await
            .map_err(|e| Failure::new(e.to_string()))?;
        Ok(exit)
    }

    async fn run_for_output(&self, args: &[String], mut fs: VirtualFs) -> Result<Vec<u8>> {
        let exit = self.run(args, &mut fs).await?;
        match fs.take_file(OUTPUT_FILE) {
            Some(bytes) => {
                if !exit.success() {
                    debug!(code = exit.code, "engine exited non-zero but wrote its output");
                }
                Ok(bytes)
            }
            None => Err(failure_from(&exit, "engine produced no output").into()),
        }
    }

    async fn create_pdf(&self, config: &Config, inputs: &[&[u8]], options: &CompressOptions) -> Result<Vec<u8>> {
        let mut fs = VirtualFs::new();
        let mut names = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let name = input_name(index);
            fs.write_file(name.clone(), input.to_vec());
            names.push(name);
        }

        let args = pdfwrite_args(config, options, &names);
        self.run_for_output(&args, fs).await
    }

    /// Rewrites a document with the given settings, typically shrinking it.
    pub async fn optimize_pdf(&self, config: &Config, input: &[u8], options: &CompressOptions) -> Result<Vec<u8>> {
        self.create_pdf(config, &[input], options).await
    }

    /// Merges documents, in order, into one.
    pub async fn combine_pdf(&self, config: &Config, inputs: &[Vec<u8>], options: &CompressOptions) -> Result<Vec<u8>> {
        let inputs: Vec<&[u8]> = inputs.iter().map(Vec::as_slice).collect();
        self.create_pdf(config, &inputs, options).await
    }

    /// Produces one document per page list.
    pub async fn split_pdf(
        &self,
        config: &Config,
        input: &[u8],
        page_lists: &[PageList],
        options: &CompressOptions,
    ) -> Result<Vec<Vec<u8>>> {
        let mut outputs = Vec::with_capacity(page_lists.len());
        for page_list in page_lists {
            let options = CompressOptions {
                page_list: Some(page_list.clone()),
                ..options.clone()
            };
            outputs.push(self.create_pdf(config, &[input], &options).await?);
        }
        Ok(outputs)
    }

    /// Encrypts a document. The owner password defaults to the user password.
    pub async fn add_password(
        &self,
        config: &Config,
        input: &[u8],
        user_password: &str,
        owner_password: Option<&str>,
    ) -> Result<Vec<u8>> {
        let options = CompressOptions {
            user_password: Some(user_password.to_string()),
            owner_password: Some(owner_password.unwrap_or(user_password).to_string()),
            ..Default::default()
        };
        self.create_pdf(config, &[input], &options).await
    }

    /// Decrypts a document with its password and writes it unprotected.
    pub async fn remove_password(&self, config: &Config, input: &[u8], password: &str) -> Result<Vec<u8>> {
        let options = CompressOptions {
            password: Some(password.to_string()),
            keep_password: false,
            ..Default::default()
        };
        self.create_pdf(config, &[input], &options).await
    }

    pub async fn render_page_as_image(
        &self,
        config: &Config,
        input: &[u8],
        page_number: u32,
        options: &RenderOptions,
    ) -> Result<Vec<u8>> {
        let mut fs = VirtualFs::new();
        fs.write_file(INPUT_FILE, input.to_vec());
        let args = render_args(config, page_number, options);
        self.run_for_output(&args, fs).await
    }

    pub async fn get_info(&self, config: &Config, input: &[u8], options: &InfoOptions) -> Result<Info> {
        let mut fs = VirtualFs::new();
        fs.write_file(INPUT_FILE, input.to_vec());
        let args = info_args(config, options);

        // Whatever was printed is the answer, even from a run that failed.
        let exit = self.run(&args, &mut fs).await?;
        Ok(Info::from_messages(exit.messages.iter().map(String::as_str)))
    }

    /// Whether the document cannot be opened without a password.
    pub async fn is_require_password(&self, config: &Config, input: &[u8]) -> Result<bool> {
        let mut fs = VirtualFs::new();
        fs.write_file(INPUT_FILE, input.to_vec());
        let mut args = prelude(config, false);
        args.push(INPUT_FILE.to_string());

        let exit = self.run(&args, &mut fs).await?;
        let mentions_password = exit
            .messages
            .iter()
            .any(|line| line.to_ascii_lowercase().contains("password"));
        Ok(!exit.success() && mentions_password)
    }
}

impl std::fmt::Debug for Commands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commands").finish_non_exhaustive()
    }
}
