use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

// ─── Typed schema ────────────────────────────────────────────────────────────

/// Top-level configuration. Every field has a default, so a missing or empty
/// `config.toml` is a valid (if tokenless) configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub locale: String,
    pub telegram: TelegramConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// `["*"]` admits every sender; otherwise entries match the numeric user
    /// id or the username.
    pub allowed_users: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Template image, resolved against `base_dir` when relative.
    pub base_image: PathBuf,
    /// Encoder name, e.g. `"JPEG"` or `"PNG"`. Kept as written; the renderer
    /// rejects names it cannot encode.
    pub output_format: String,
    /// strftime pattern used both to parse user input and to stamp the image.
    pub time_format: String,
    pub amount: TextPlacement,
    pub time: TextPlacement,
    /// Directory relative paths resolve against (the config file's parent).
    pub base_dir: PathBuf,
}

/// Drawing instructions for one text value.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPlacement {
    pub x: i64,
    pub y: i64,
    pub font: Option<PathBuf>,
    pub size: u32,
    pub fill: Color,
    pub anchor: Anchor,
    pub erase: Option<EraseRect>,
    pub bold: bool,
    pub bold_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    pub fill: Color,
}

/// 24-bit RGB color parsed from `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const BLACK: Color = Color([0, 0, 0]);
    pub const WHITE: Color = Color([255, 255, 255]);

    pub fn from_hex(s: &str) -> Result<Self, String> {
        let hex_str = s.trim().trim_start_matches('#');
        let bytes =
            hex::decode(hex_str).map_err(|_| format!("invalid hex color {s:?}"))?;
        if bytes.len() != 3 {
            return Err(format!("expected #RRGGBB, got {s:?}"));
        }
        Ok(Color([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn rgb(self) -> image::Rgb<u8> {
        image::Rgb(self.0)
    }
}

/// Two-character anchor code: horizontal `l`/`m`/`r`, vertical one of
/// `a` `t` `m` `s` `b` `d` (ascender, top, middle, baseline, bottom,
/// descender). Single-line layout treats `t` like `a` and `b` like `d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub h: HAlign,
    pub v: VAlign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAlign {
    Ascender,
    Top,
    Middle,
    Baseline,
    Bottom,
    Descender,
}

impl Anchor {
    pub const TOP_LEFT: Anchor = Anchor {
        h: HAlign::Left,
        v: VAlign::Ascender,
    };

    pub fn parse(s: &str) -> Result<Self, String> {
        let mut chars = s.chars();
        let (Some(h), Some(v), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(format!("expected a two-character anchor, got {s:?}"));
        };
        let h = match h {
            'l' => HAlign::Left,
            'm' => HAlign::Center,
            'r' => HAlign::Right,
            other => return Err(format!("unknown horizontal anchor {other:?}")),
        };
        let v = match v {
            'a' => VAlign::Ascender,
            't' => VAlign::Top,
            'm' => VAlign::Middle,
            's' => VAlign::Baseline,
            'b' => VAlign::Bottom,
            'd' => VAlign::Descender,
            other => return Err(format!("unknown vertical anchor {other:?}")),
        };
        Ok(Self { h, v })
    }
}

/// Encoders the renderer knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "JPEG" | "JPG" => Some(Self::Jpeg),
            "PNG" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

// ─── Defaults ────────────────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            locale: "ru".into(),
            telegram: TelegramConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            allowed_users: vec!["*".into()],
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            base_image: PathBuf::from("bot.jpeg"),
            output_format: "JPEG".into(),
            time_format: "%Y/%m/%d %H:%M:%S".into(),
            amount: TextPlacement::amount_defaults(),
            time: TextPlacement::time_defaults(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl TextPlacement {
    pub fn amount_defaults() -> Self {
        Self {
            x: 200,
            y: 300,
            font: None,
            size: 48,
            fill: Color::BLACK,
            anchor: Anchor::TOP_LEFT,
            erase: None,
            bold: false,
            bold_offset: 1,
        }
    }

    pub fn time_defaults() -> Self {
        Self {
            x: 200,
            y: 380,
            size: 36,
            fill: Color([0x33, 0x33, 0x33]),
            ..Self::amount_defaults()
        }
    }
}

impl RenderConfig {
    /// Resolve a possibly-relative path against the config directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn template_path(&self) -> PathBuf {
        self.resolve(&self.base_image)
    }
}

// ─── Raw TOML layer ──────────────────────────────────────────────────────────
//
// The file is deserialized into all-optional raw structs and merged onto the
// defaults field by field, so a partial `[render.amount]` table keeps the
// defaults for the keys it omits.

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    locale: Option<String>,
    telegram: Option<RawTelegram>,
    render: Option<RawRender>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTelegram {
    bot_token: Option<String>,
    allowed_users: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRender {
    base_image: Option<PathBuf>,
    output_format: Option<String>,
    time_format: Option<String>,
    amount: Option<RawPlacement>,
    time: Option<RawPlacement>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPlacement {
    x: Option<i64>,
    y: Option<i64>,
    font: Option<PathBuf>,
    size: Option<u32>,
    fill: Option<String>,
    anchor: Option<String>,
    erase: Option<RawErase>,
    bold: Option<bool>,
    bold_offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawErase {
    x: i64,
    y: i64,
    width: u32,
    height: u32,
    fill: Option<String>,
}

impl RawPlacement {
    fn merged(self, mut base: TextPlacement, field: &str) -> Result<TextPlacement, ConfigError> {
        if let Some(x) = self.x {
            base.x = x;
        }
        if let Some(y) = self.y {
            base.y = y;
        }
        if self.font.is_some() {
            base.font = self.font;
        }
        if let Some(size) = self.size {
            base.size = size;
        }
        if let Some(fill) = self.fill {
            base.fill = Color::from_hex(&fill)
                .map_err(|e| ConfigError::Validation(format!("{field}.fill: {e}")))?;
        }
        if let Some(anchor) = self.anchor {
            base.anchor = Anchor::parse(&anchor)
                .map_err(|e| ConfigError::Validation(format!("{field}.anchor: {e}")))?;
        }
        if let Some(erase) = self.erase {
            let fill = match erase.fill {
                Some(hex_str) => Color::from_hex(&hex_str)
                    .map_err(|e| ConfigError::Validation(format!("{field}.erase.fill: {e}")))?,
                None => Color::WHITE,
            };
            base.erase = Some(EraseRect {
                x: erase.x,
                y: erase.y,
                width: erase.width,
                height: erase.height,
                fill,
            });
        }
        if let Some(bold) = self.bold {
            base.bold = bold;
        }
        if let Some(offset) = self.bold_offset {
            base.bold_offset = offset;
        }
        Ok(base)
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl Config {
    /// Load from a TOML file. A missing file yields the defaults; relative
    /// render paths resolve against the file's directory either way.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = if path.exists() {
            let contents = fs::read_to_string(path)?;
            toml::from_str::<RawConfig>(&contents)
                .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?
        } else {
            RawConfig::default()
        };

        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let mut config = Config::default();
        if let Some(locale) = raw.locale {
            config.locale = locale;
        }
        if let Some(telegram) = raw.telegram {
            if let Some(token) = telegram.bot_token {
                config.telegram.bot_token = token;
            }
            if let Some(users) = telegram.allowed_users {
                config.telegram.allowed_users = users;
            }
        }
        if let Some(render) = raw.render {
            if let Some(base_image) = render.base_image {
                config.render.base_image = base_image;
            }
            if let Some(format) = render.output_format {
                config.render.output_format = format;
            }
            if let Some(time_format) = render.time_format {
                config.render.time_format = time_format;
            }
            if let Some(amount) = render.amount {
                config.render.amount =
                    amount.merged(TextPlacement::amount_defaults(), "render.amount")?;
            }
            if let Some(time) = render.time {
                config.render.time = time.merged(TextPlacement::time_defaults(), "render.time")?;
            }
        }
        config.render.base_dir = base_dir;

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("BOT_TOKEN")
            && !token.is_empty()
        {
            self.telegram.bot_token = token;
        }

        if let Ok(lang) = std::env::var("STAMPBOT_LANG")
            && !lang.is_empty()
        {
            self.locale = lang;
        }
    }

    /// Normalise the configured locale and hand it to `rust_i18n`.
    pub fn apply_locale(&self) {
        let locale = normalise_locale(&self.locale);
        if locale.is_empty() {
            rust_i18n::set_locale("ru");
        } else {
            rust_i18n::set_locale(&locale);
        }
    }

    /// Sanity checks over the render section. Token presence is checked
    /// separately so the offline subcommands work without one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if OutputFormat::parse(&self.render.output_format).is_none() {
            return Err(ConfigError::Validation(format!(
                "render.output_format: unsupported format {:?}",
                self.render.output_format
            )));
        }
        if self.render.time_format.trim().is_empty() {
            return Err(ConfigError::Validation(
                "render.time_format: must not be empty".into(),
            ));
        }
        if self.render.amount.size == 0 {
            return Err(ConfigError::Validation(
                "render.amount.size: must be greater than zero".into(),
            ));
        }
        if self.render.time.size == 0 {
            return Err(ConfigError::Validation(
                "render.time.size: must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn require_token(&self) -> Result<&str, ConfigError> {
        let token = self.telegram.bot_token.trim();
        if token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        Ok(token)
    }
}

/// Normalise `"ru_RU.UTF-8"` -> `"ru"`, `"en_US"` -> `"en"`, passthrough `"en"`.
fn normalise_locale(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    let base = trimmed.split('.').next().unwrap_or(&trimmed);
    let lang = base.split('_').next().unwrap_or(base);
    lang.to_string()
}

// ─── Provider seam ───────────────────────────────────────────────────────────

/// Source of the render section. The flow engine loads it anew at every step
/// so placement edits in the TOML take effect without a restart.
pub trait ConfigProvider: Send + Sync {
    fn load(&self) -> Result<RenderConfig, ConfigError>;
}

/// File-backed provider: re-reads the TOML on every call.
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigProvider for FileConfigProvider {
    fn load(&self) -> Result<RenderConfig, ConfigError> {
        Ok(Config::load(&self.path)?.render)
    }
}

/// Fixed provider for the one-shot CLI render and for tests.
pub struct FixedConfigProvider(pub RenderConfig);

impl ConfigProvider for FixedConfigProvider {
    fn load(&self) -> Result<RenderConfig, ConfigError> {
        Ok(self.0.clone())
    }
}
