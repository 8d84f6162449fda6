//! Font resolution with a guaranteed fallback.
//!
//! Resolution walks an ordered chain: the configured font file, a probe of
//! the platform font directories, a list of well-known font locations, and
//! finally an embedded Spleen bitmap font. The last tier always succeeds, so
//! rendering can degrade but never abort for want of a font.

use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, FontVec};
use spleen_font::{FONT_6X12, FONT_8X16, FONT_12X24};

/// Face names probed inside the platform font directories, best first.
const FONT_CANDIDATES: &[&str] = &[
    "DejaVuSans.ttf",
    "LiberationSans-Regular.ttf",
    "NotoSans-Regular.ttf",
    "FreeSans.ttf",
    "arial.ttf",
    "segoeui.ttf",
];

/// Absolute locations tried after the directory probe comes up empty.
const KNOWN_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const MAX_PROBE_DEPTH: u8 = 3;

/// A usable font: scalable when one was found, embedded bitmap otherwise.
#[derive(Debug, Clone)]
pub enum FontHandle {
    Scalable(FontArc),
    Bitmap(BitmapFont),
}

/// One of the embedded Spleen PSF2 fonts with its fixed cell size.
#[derive(Debug, Clone, Copy)]
pub struct BitmapFont {
    pub data: &'static [u8],
    pub width: u32,
    pub height: u32,
}

impl BitmapFont {
    /// Nearest cell size for a requested pixel height. The requested size is
    /// not honored beyond this bucketing.
    pub fn nearest(size: u32) -> Self {
        if size < 16 {
            Self {
                data: FONT_6X12,
                width: 6,
                height: 12,
            }
        } else if size < 28 {
            Self {
                data: FONT_8X16,
                width: 8,
                height: 16,
            }
        } else {
            Self {
                data: FONT_12X24,
                width: 12,
                height: 24,
            }
        }
    }
}

pub struct FontResolver {
    base_dir: PathBuf,
    probe_dirs: Vec<PathBuf>,
    known_paths: Vec<PathBuf>,
}

impl FontResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            probe_dirs: default_probe_dirs(),
            known_paths: KNOWN_FONT_PATHS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Resolver with explicit probe locations; tests pin these down.
    pub fn with_dirs(
        base_dir: impl Into<PathBuf>,
        probe_dirs: Vec<PathBuf>,
        known_paths: Vec<PathBuf>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            probe_dirs,
            known_paths,
        }
    }

    /// Walk the fallback chain. Never fails: the final tier is embedded.
    pub fn load(&self, configured: Option<&Path>, size: u32) -> FontHandle {
        if let Some(path) = configured {
            let resolved = if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.base_dir.join(path)
            };
            if let Some(font) = load_scalable(&resolved) {
                return FontHandle::Scalable(font);
            }
            tracing::warn!(
                "configured font {} not usable, falling back",
                resolved.display()
            );
        }

        for dir in &self.probe_dirs {
            if let Some(path) = find_candidate(dir)
                && let Some(font) = load_scalable(&path)
            {
                tracing::info!("using system font {}", path.display());
                return FontHandle::Scalable(font);
            }
        }

        for path in &self.known_paths {
            if path.exists()
                && let Some(font) = load_scalable(path)
            {
                tracing::info!("using fallback font {}", path.display());
                return FontHandle::Scalable(font);
            }
        }

        tracing::warn!("no scalable font found, using embedded bitmap font (requested size {size} px is not honored)");
        FontHandle::Bitmap(BitmapFont::nearest(size))
    }
}

impl std::fmt::Debug for FontResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontResolver")
            .field("base_dir", &self.base_dir)
            .field("probe_dirs", &self.probe_dirs)
            .finish_non_exhaustive()
    }
}

fn default_probe_dirs() -> Vec<PathBuf> {
    if let Ok(dir) = std::env::var("STAMPBOT_FONT_DIR")
        && !dir.is_empty()
    {
        return vec![PathBuf::from(dir)];
    }

    let mut dirs = Vec::new();
    if cfg!(windows) {
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    } else {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME")
            && !home.is_empty()
        {
            let home = PathBuf::from(home);
            dirs.push(home.join(".fonts"));
            dirs.push(home.join(".local/share/fonts"));
        }
    }
    dirs
}

fn load_scalable(path: &Path) -> Option<FontArc> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!("font {} unreadable: {e}", path.display());
            return None;
        }
    };
    match FontVec::try_from_vec(bytes) {
        Ok(font) => Some(FontArc::from(font)),
        Err(e) => {
            tracing::debug!("font {} failed to parse: {e}", path.display());
            None
        }
    }
}

/// First candidate face found under `dir`, in candidate-priority order.
fn find_candidate(dir: &Path) -> Option<PathBuf> {
    for candidate in FONT_CANDIDATES {
        if let Some(path) = find_named(dir, candidate, 0) {
            return Some(path);
        }
    }
    None
}

fn find_named(dir: &Path, name: &str, depth: u8) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if let Some(file_name) = path.file_name().and_then(|n| n.to_str())
            && file_name.eq_ignore_ascii_case(name)
        {
            return Some(path);
        }
    }
    if depth < MAX_PROBE_DEPTH {
        for sub in subdirs {
            if let Some(hit) = find_named(&sub, name, depth + 1) {
                return Some(hit);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated(dir: &Path) -> FontResolver {
        FontResolver::with_dirs(dir, vec![], vec![])
    }

    #[test]
    fn empty_chain_falls_back_to_bitmap() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = isolated(dir.path());
        match resolver.load(None, 48) {
            FontHandle::Bitmap(font) => {
                assert_eq!((font.width, font.height), (12, 24));
            }
            FontHandle::Scalable(_) => panic!("expected the bitmap tier"),
        }
    }

    #[test]
    fn bitmap_size_buckets() {
        assert_eq!(BitmapFont::nearest(10).height, 12);
        assert_eq!(BitmapFont::nearest(20).height, 16);
        assert_eq!(BitmapFont::nearest(36).height, 24);
        assert_eq!(BitmapFont::nearest(200).height, 24);
    }

    #[test]
    fn missing_configured_font_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = isolated(dir.path());
        let handle = resolver.load(Some(Path::new("nope.ttf")), 36);
        assert!(matches!(handle, FontHandle::Bitmap(_)));
    }

    #[test]
    fn unparseable_probe_hit_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("truetype").join("dejavu");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("DejaVuSans.ttf"), b"not a font").unwrap();
        let resolver = FontResolver::with_dirs(dir.path(), vec![dir.path().to_path_buf()], vec![]);
        assert!(matches!(resolver.load(None, 48), FontHandle::Bitmap(_)));
    }

    #[test]
    fn probe_matches_names_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dejavusans.ttf"), b"junk").unwrap();
        let hit = find_candidate(dir.path()).unwrap();
        assert!(hit.ends_with("dejavusans.ttf"));
    }
}
