use std::path::{Path, PathBuf};

use serde::Serialize;

pub const DOCSET_SUFFIX: &str = ".docset";
pub const BUNDLE_IDENTIFIER_PREFIX: &str = "io.ngs.documentation.";

/// Every output location derived from a source archive and an output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleLayout {
    pub source_path: PathBuf,
    pub source_filename: String,
    pub basename: String,
    pub bundle_path: PathBuf,
    pub content_path: PathBuf,
    pub database_path: PathBuf,
    pub manifest_path: PathBuf,
    pub bundle_identifier: String,
}

impl BundleLayout {
    pub fn resolve(source_path: &Path, out_dir: &Path) -> Self {
        let source_filename = source_filename(source_path);
        let basename = strip_extension(&source_filename).to_string();
        let bundle_path = bundle_path(out_dir, &basename);

        Self {
            source_path: source_path.to_path_buf(),
            content_path: content_path(&bundle_path),
            database_path: database_path(&bundle_path),
            manifest_path: manifest_path(&bundle_path),
            bundle_identifier: bundle_identifier(&basename),
            source_filename,
            basename,
            bundle_path,
        }
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "source_path={}\nbundle_path={}\ncontent_path={}\ndatabase_path={}\nmanifest_path={}\nbundle_identifier={}",
            normalize_path(&self.source_path),
            normalize_path(&self.bundle_path),
            normalize_path(&self.content_path),
            normalize_path(&self.database_path),
            normalize_path(&self.manifest_path),
            self.bundle_identifier
        )
    }
}

pub fn source_filename(source_path: &Path) -> String {
    source_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_path.to_string_lossy().into_owned())
}

pub fn basename(source_path: &Path) -> String {
    strip_extension(&source_filename(source_path)).to_string()
}

fn strip_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(index) => &filename[..index],
        None => filename,
    }
}

/// An output directory that already names a `.docset` is the bundle root itself.
pub fn bundle_path(out_dir: &Path, basename: &str) -> PathBuf {
    if out_dir.to_string_lossy().ends_with(DOCSET_SUFFIX) {
        return out_dir.to_path_buf();
    }
    out_dir.join(format!("{basename}{DOCSET_SUFFIX}"))
}

pub fn content_path(bundle_path: &Path) -> PathBuf {
    bundle_path
        .join("Contents")
        .join("Resources")
        .join("Documents")
}

pub fn database_path(bundle_path: &Path) -> PathBuf {
    bundle_path
        .join("Contents")
        .join("Resources")
        .join("docSet.dsidx")
}

pub fn manifest_path(bundle_path: &Path) -> PathBuf {
    bundle_path.join("Contents").join("Info.plist")
}

pub fn bundle_identifier(basename: &str) -> String {
    let safe: String = basename
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .collect();
    format!("{BUNDLE_IDENTIFIER_PREFIX}{safe}")
}

pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{BundleLayout, basename, bundle_identifier, bundle_path, source_filename};

    #[test]
    fn source_filename_and_basename_drop_directories_and_last_extension() {
        let source = Path::new("/foo/bar/baz.chm");
        assert_eq!(source_filename(source), "baz.chm");
        assert_eq!(basename(source), "baz");
        assert_eq!(basename(Path::new("/foo/archive.v2.chm")), "archive.v2");
        assert_eq!(basename(Path::new("relative/README")), "README");
    }

    #[test]
    fn layout_nests_bundle_under_output_directory() {
        let layout = BundleLayout::resolve(Path::new("/foo/bar/baz.chm"), Path::new("/qux"));

        assert_eq!(layout.bundle_path, PathBuf::from("/qux/baz.docset"));
        assert_eq!(
            layout.content_path,
            PathBuf::from("/qux/baz.docset/Contents/Resources/Documents")
        );
        assert_eq!(
            layout.database_path,
            PathBuf::from("/qux/baz.docset/Contents/Resources/docSet.dsidx")
        );
        assert_eq!(
            layout.manifest_path,
            PathBuf::from("/qux/baz.docset/Contents/Info.plist")
        );
        assert_eq!(layout.bundle_identifier, "io.ngs.documentation.baz");
    }

    #[test]
    fn output_directory_ending_in_docset_is_used_verbatim() {
        let layout = BundleLayout::resolve(
            Path::new("/foo/bar/baz.chm"),
            Path::new("/qux/foo.docset"),
        );

        assert_eq!(layout.bundle_path, PathBuf::from("/qux/foo.docset"));
        assert_eq!(
            layout.content_path,
            PathBuf::from("/qux/foo.docset/Contents/Resources/Documents")
        );
        assert_eq!(
            layout.database_path,
            PathBuf::from("/qux/foo.docset/Contents/Resources/docSet.dsidx")
        );
        assert_eq!(
            layout.manifest_path,
            PathBuf::from("/qux/foo.docset/Contents/Info.plist")
        );
        assert_eq!(layout.basename, "baz");
    }

    #[test]
    fn bundle_path_is_stable_across_derivations() {
        let first = bundle_path(Path::new("/q"), "foo");
        let second = bundle_path(Path::new("/q"), "foo");
        assert_eq!(first, second);
        assert_eq!(
            bundle_path(&first, "ignored"),
            PathBuf::from("/q/foo.docset")
        );
    }

    #[test]
    fn bundle_identifier_keeps_only_ascii_word_characters_and_hyphens() {
        let layout = BundleLayout::resolve(
            Path::new("/foo/bar/我輩は Lorem ipsum dolor sit amet,?-"),
            Path::new("/qux/foo.docset"),
        );
        assert_eq!(
            layout.bundle_identifier,
            "io.ngs.documentation.Loremipsumdolorsitamet-"
        );
        assert_eq!(
            bundle_identifier("snake_case-Name 2"),
            "io.ngs.documentation.snake_case-Name2"
        );
    }

    #[test]
    fn diagnostics_lists_every_derived_path() {
        let layout = BundleLayout::resolve(Path::new("/foo/baz.chm"), Path::new("/qux"));
        let diagnostics = layout.diagnostics();
        assert!(diagnostics.contains("bundle_path=/qux/baz.docset"));
        assert!(diagnostics.contains("manifest_path=/qux/baz.docset/Contents/Info.plist"));
        assert!(diagnostics.contains("bundle_identifier=io.ngs.documentation.baz"));
    }
}
