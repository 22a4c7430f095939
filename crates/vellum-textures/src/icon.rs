//! Icon id to asset path resolution.

use std::fmt;

use crate::error::{TextureError, TextureResult};
use crate::io::AssetSource;

/// Language folders icons may be localized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IconLanguage {
    Japanese,
    #[default]
    English,
    German,
    French,
    /// A language without localized icons.
    Other,
}

impl IconLanguage {
    /// Folder prefix, including the trailing slash.
    pub fn folder(self) -> Option<&'static str> {
        match self {
            IconLanguage::Japanese => Some("ja/"),
            IconLanguage::English => Some("en/"),
            IconLanguage::German => Some("de/"),
            IconLanguage::French => Some("fr/"),
            IconLanguage::Other => None,
        }
    }
}

/// Describes an icon to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IconLookup {
    pub icon_id: u32,
    /// Prefer the high-quality item variant.
    pub item_hq: bool,
    /// Prefer the high-resolution file.
    pub hi_res: bool,
    /// Language folder to try; `None` uses the cache's configured language.
    pub language: Option<IconLanguage>,
}

impl IconLookup {
    /// A hi-res, non-HQ lookup in the default language.
    pub fn new(icon_id: u32) -> Self {
        Self {
            icon_id,
            item_hq: false,
            hi_res: true,
            language: None,
        }
    }

    pub fn with_item_hq(mut self, item_hq: bool) -> Self {
        self.item_hq = item_hq;
        self
    }

    pub fn with_hi_res(mut self, hi_res: bool) -> Self {
        self.hi_res = hi_res;
        self
    }

    pub fn with_language(mut self, language: IconLanguage) -> Self {
        self.language = Some(language);
        self
    }

    /// Candidate paths in the order they are tried.
    ///
    /// 1. The item folder (`hq/` when `item_hq`), at the requested resolution.
    /// 2. The language folder, hi-res then normal.
    /// 3. The plain folder, hi-res then normal.
    pub fn candidates(&self, default_language: IconLanguage) -> Vec<String> {
        let mut paths: Vec<String> = Vec::with_capacity(5);
        let mut push = |folder: &str, hi_res: bool| {
            let path = format_icon_path(self.icon_id, folder, hi_res);
            if !paths.contains(&path) {
                paths.push(path);
            }
        };

        push(if self.item_hq { "hq/" } else { "" }, self.hi_res);

        let language = self.language.unwrap_or(default_language);
        if let Some(folder) = language.folder() {
            push(folder, self.hi_res);
            if self.hi_res {
                push(folder, false);
            }
        }

        push("", self.hi_res);
        if self.hi_res {
            push("", false);
        }

        paths
    }

    /// Resolve to the first candidate that exists in `source`.
    pub fn resolve(
        &self,
        source: &dyn AssetSource,
        default_language: IconLanguage,
    ) -> TextureResult<String> {
        self.candidates(default_language)
            .into_iter()
            .find(|path| source.exists(path))
            .ok_or_else(|| TextureError::not_found(self.to_string()))
    }
}

impl fmt::Display for IconLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "icon {}", self.icon_id)?;
        if self.item_hq {
            write!(f, " (hq)")?;
        }
        if self.hi_res {
            write!(f, " (hr)")?;
        }
        Ok(())
    }
}

/// Format an icon path: `ui/icon/{group}000/{folder}{id:06}[_hr1].tex`.
pub fn format_icon_path(icon_id: u32, folder: &str, hi_res: bool) -> String {
    let suffix = if hi_res { "_hr1" } else { "" };
    format!(
        "ui/icon/{:03}000/{}{:06}{}.tex",
        icon_id / 1000,
        folder,
        icon_id,
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::RawImage;
    use crate::io::MemorySource;

    #[test]
    fn test_format_icon_path() {
        assert_eq!(
            format_icon_path(60_123, "", false),
            "ui/icon/060000/060123.tex"
        );
        assert_eq!(
            format_icon_path(1_234, "hq/", true),
            "ui/icon/001000/hq/001234_hr1.tex"
        );
        assert_eq!(
            format_icon_path(7, "en/", false),
            "ui/icon/000000/en/000007.tex"
        );
    }

    #[test]
    fn test_candidate_order() {
        let lookup = IconLookup::new(21_000).with_item_hq(true);
        let candidates = lookup.candidates(IconLanguage::German);
        assert_eq!(
            candidates,
            vec![
                "ui/icon/021000/hq/021000_hr1.tex",
                "ui/icon/021000/de/021000_hr1.tex",
                "ui/icon/021000/de/021000.tex",
                "ui/icon/021000/021000_hr1.tex",
                "ui/icon/021000/021000.tex",
            ]
        );
    }

    #[test]
    fn test_plain_lookup_skips_repeated_paths() {
        let lookup = IconLookup::new(5)
            .with_hi_res(false)
            .with_language(IconLanguage::Other);
        assert_eq!(lookup.candidates(IconLanguage::English), vec!["ui/icon/000000/000005.tex"]);
    }

    #[test]
    fn test_resolve_falls_back() {
        let source = MemorySource::new();
        source.insert("ui/icon/002000/2001.tex", RawImage::transparent(1, 1));
        source.insert("ui/icon/002000/002001.tex", RawImage::transparent(1, 1));

        let path = IconLookup::new(2001).resolve(&source, IconLanguage::English);
        assert_eq!(path.as_deref(), Ok("ui/icon/002000/002001.tex"));

        source.insert("ui/icon/002000/en/002001_hr1.tex", RawImage::transparent(2, 2));
        let path = IconLookup::new(2001).resolve(&source, IconLanguage::English);
        assert_eq!(path.as_deref(), Ok("ui/icon/002000/en/002001_hr1.tex"));
    }

    #[test]
    fn test_resolve_missing_is_not_found() {
        let source = MemorySource::new();
        let err = IconLookup::new(9).resolve(&source, IconLanguage::English).unwrap_err();
        assert!(err.is_not_found());
    }
}
