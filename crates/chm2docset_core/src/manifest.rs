use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub const INDEX_FILE_PATH: &str = "Welcome.htm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDescriptor {
    pub bundle_identifier: String,
    pub display_name: String,
    pub platform_family: String,
}

impl ManifestDescriptor {
    pub fn render(&self) -> String {
        render(
            &self.bundle_identifier,
            &self.display_name,
            &self.platform_family,
        )
    }
}

/// Render the `Info.plist` a documentation browser reads to identify the bundle.
///
/// Key order and whitespace are fixed; values are XML-escaped.
pub fn render(identifier: &str, display_name: &str, platform_family: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
  <dict>
    <key>dashIndexFilePath</key>
    <string>{index}</string>
    <key>CFBundleIdentifier</key>
    <string>{identifier}</string>
    <key>CFBundleName</key>
    <string>{name}</string>
    <key>DocSetPlatformFamily</key>
    <string>{platform}</string>
    <key>isDashDocset</key>
    <true/>
  </dict>
</plist>"#,
        index = INDEX_FILE_PATH,
        identifier = escape_xml(identifier),
        name = escape_xml(display_name),
        platform = escape_xml(platform_family),
    )
}

pub fn write_manifest(path: &Path, descriptor: &ManifestDescriptor) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, descriptor.render())
        .with_context(|| format!("failed to write {}", path.display()))
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{ManifestDescriptor, render, write_manifest};

    const BAZ_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
  <dict>
    <key>dashIndexFilePath</key>
    <string>Welcome.htm</string>
    <key>CFBundleIdentifier</key>
    <string>io.ngs.documentation.baz</string>
    <key>CFBundleName</key>
    <string>baz</string>
    <key>DocSetPlatformFamily</key>
    <string></string>
    <key>isDashDocset</key>
    <true/>
  </dict>
</plist>"#;

    #[test]
    fn render_matches_fixed_plist_with_empty_platform() {
        assert_eq!(render("io.ngs.documentation.baz", "baz", ""), BAZ_MANIFEST);
    }

    #[test]
    fn render_is_deterministic_and_embeds_platform() {
        let first = render("io.ngs.documentation.baz", "baz", "mac");
        let second = render("io.ngs.documentation.baz", "baz", "mac");
        assert_eq!(first, second);
        assert!(first.contains("<key>DocSetPlatformFamily</key>\n    <string>mac</string>"));
    }

    #[test]
    fn render_escapes_markup_in_values() {
        let rendered = render("io.ngs.documentation.ab", "A & <B>", "\"x\"");
        assert!(rendered.contains("<string>A &amp; &lt;B&gt;</string>"));
        assert!(rendered.contains("<string>&quot;x&quot;</string>"));
    }

    #[test]
    fn write_manifest_creates_parent_and_writes_text() {
        let temp = tempdir().expect("tempdir");
        let path = temp
            .path()
            .join("foo.docset")
            .join("Contents")
            .join("Info.plist");
        let descriptor = ManifestDescriptor {
            bundle_identifier: "io.ngs.documentation.baz".to_string(),
            display_name: "baz".to_string(),
            platform_family: String::new(),
        };

        write_manifest(&path, &descriptor).expect("write manifest");
        let written = fs::read_to_string(&path).expect("read manifest");
        assert_eq!(written, BAZ_MANIFEST);
    }
}
