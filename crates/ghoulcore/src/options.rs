//! Command options and their engine argument encodings.
//!
//! Options deserialize from partial objects: any field left out takes its
//! default, so `{}` is a complete `CompressOptions`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfSettings {
    #[default]
    Screen,
    Ebook,
    Printer,
    Prepress,
    Default,
}

impl PdfSettings {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Ebook => "ebook",
            Self::Printer => "printer",
            Self::Prepress => "prepress",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorConversion {
    #[default]
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "CMYK")]
    Cmyk,
}

impl ColorConversion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rgb => "RGB",
            Self::Cmyk => "CMYK",
        }
    }
}

/// One entry of a page list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageSpec {
    Page(u32),
    Pair([u32; 2]),
    Range { start: u32, end: u32 },
    Text(String),
}

impl PageSpec {
    fn to_arg(&self) -> String {
        match self {
            Self::Page(page) => page.to_string(),
            Self::Pair([start, end]) | Self::Range { start, end } => format!("{}-{}", start, end),
            Self::Text(text) => text.clone(),
        }
    }
}

/// Pages to select, e.g. `[1, [3, 5], "8-10"]` or the literal `"1,3-5"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageList {
    Specs(Vec<PageSpec>),
    Text(String),
}

impl PageList {
    /// Encodes the list as the engine's `PageList` value.
    pub fn to_arg(&self) -> String {
        match self {
            Self::Specs(specs) => specs.iter().map(PageSpec::to_arg).collect::<Vec<_>>().join(","),
            Self::Text(text) => text.clone(),
        }
    }
}

impl From<&str> for PageList {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<PageSpec>> for PageList {
    fn from(specs: Vec<PageSpec>) -> Self {
        Self::Specs(specs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompressOptions {
    /// Password needed to open the input.
    pub password: Option<String>,
    pub pdf_settings: PdfSettings,
    /// Linearize the output.
    pub fast_web_view: bool,
    pub compatibility_level: String,
    pub color_conversion_strategy: ColorConversion,
    pub no_transparency: bool,
    pub owner_password: Option<String>,
    pub user_password: Option<String>,
    /// Re-apply `password` to the output when no explicit passwords are given.
    pub keep_password: bool,
    pub page_list: Option<PageList>,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            password: None,
            pdf_settings: PdfSettings::Screen,
            fast_web_view: true,
            compatibility_level: "1.4".into(),
            color_conversion_strategy: ColorConversion::Rgb,
            no_transparency: true,
            owner_password: None,
            user_password: None,
            keep_password: true,
            page_list: None,
        }
    }
}

impl CompressOptions {
    /// The option-dependent part of a `pdfwrite` argument vector.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        let mut user_password = self.user_password.clone();
        let mut owner_password = self.owner_password.clone();

        if let Some(password) = &self.password {
            args.push(format!("-sPDFPassword={}", password));

            if self.keep_password {
                user_password = user_password.or_else(|| Some(password.clone()));
                owner_password = owner_password.or_else(|| Some(password.clone()));
            }
        }

        if let Some(user) = &user_password {
            let owner = owner_password.as_deref().unwrap_or(user);
            args.push(format!("-sUserPassword={}", user));
            args.push(format!("-sOwnerPassword={}", owner));
        }

        if self.no_transparency {
            args.push("-dNOTRANSPARENCY".into());
        }

        if let Some(page_list) = &self.page_list {
            args.push(format!("-sPageList={}", page_list.to_arg()));
        }

        args.push(format!("-dCompatibilityLevel={}", self.compatibility_level));
        args.push(format!(
            "-sColorConversionStrategy={}",
            self.color_conversion_strategy.as_str()
        ));
        args.push(format!("-dPDFSETTINGS=/{}", self.pdf_settings.as_str()));
        args.push(format!("-dFastWebView={}", self.fast_web_view));
        args
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpg,
    Png,
}

impl ImageFormat {
    /// Output device for this format.
    pub fn device(&self) -> &'static str {
        match self {
            Self::Jpg => "jpeg",
            Self::Png => "png16m",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    /// Dots per inch.
    pub resolution: u32,
    pub text_alpha_bits: u8,
    pub graphics_alpha_bits: u8,
    pub format: ImageFormat,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            resolution: 96,
            text_alpha_bits: 4,
            graphics_alpha_bits: 4,
            format: ImageFormat::Jpg,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfoOptions {
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    pub num_pages: u32,
    pub pages: Vec<PageInfo>,
}

impl Info {
    /// Builds document info from the engine's `PDFINFO` diagnostics.
    ///
    /// Recognizes `File has N page(s)` and `Page N MediaBox: [x0 y0 x1 y1]`;
    /// every other line is ignored.
    pub fn from_messages<'a>(messages: impl IntoIterator<Item = &'a str>) -> Self {
        let mut info = Self::default();

        for line in messages {
            if let Some(count) = parse_page_count(line) {
                info.num_pages = count;
            }
            if let Some(page) = parse_media_box(line) {
                info.pages.push(page);
            }
        }

        info
    }
}

static PAGE_COUNT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"File has (\d+) pages?").ok());

static MEDIA_BOX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Page (\d+) MediaBox: \[([\d .]+)\]").ok());

fn parse_page_count(line: &str) -> Option<u32> {
    let captures = PAGE_COUNT.as_ref()?.captures(line)?;
    captures[1].parse().ok()
}

fn parse_media_box(line: &str) -> Option<PageInfo> {
    let captures = MEDIA_BOX.as_ref()?.captures(line)?;
    let page = captures[1].parse().ok()?;
    let mut coords = captures[2].split_whitespace().skip(2).map(str::parse::<f64>);

    Some(PageInfo {
        page,
        width: coords.next()?.ok()?,
        height: coords.next()?.ok()?,
    })
}
