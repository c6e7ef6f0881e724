mod cvfile;
mod digest;
mod emit;
mod errors;
mod package;
mod reader;
mod schema;
mod scope;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use validation::{Digests, Model, ResolveOptions};

pub use errors::LoadError;
pub use package::{
    is_zip, write_package, CV_DIR, MODEL_MEMBER, SCHEMA_MEMBER, SIGNATURES_MEMBER,
};
pub use schema::BUNDLED_SCHEMA;

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Leave external-file CVs unresolved instead of parsing them.
    pub skip_cv_parse: bool,
    /// Directory external CV paths are relative to. Defaults to the
    /// model document's own directory. Ignored for packaged archives,
    /// whose CV directory is always the `cv/` member tree.
    pub cv_dir: Option<PathBuf>,
}

/// Load a model from |path|, which may be a standalone XML document or a
/// packaged archive (detected by content, not extension). Loading is
/// atomic: either a fully resolved, digest-verified Model is returned,
/// or the first error is.
pub fn load(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Model, LoadError> {
    let path = path.as_ref();
    if package::is_zip(path)? {
        let model = package::load_package(path, options)?;
        tracing::info!(
            path = %path.display(),
            model = %model.digests.model_sha1,
            "loaded packaged model"
        );
        Ok(model)
    } else {
        let model = load_plain(path, options)?;
        tracing::info!(
            path = %path.display(),
            model = %model.digests.model_sha1,
            "loaded model"
        );
        Ok(model)
    }
}

fn load_plain(path: &Path, options: &LoadOptions) -> Result<Model, LoadError> {
    // The document is read once in raw byte mode; its digest covers the
    // bytes exactly as stored, before any in-memory reformatting.
    let model_bytes = std::fs::read(path)?;
    let mtime = std::fs::metadata(path).and_then(|m| m.modified()).ok();

    let decl = reader::read(&model_bytes)?;

    let cv_dir = match &options.cv_dir {
        Some(dir) => dir.clone(),
        None => path.parent().unwrap_or(Path::new(".")).to_path_buf(),
    };
    let mut source = DirTerms {
        root: cv_dir,
        stream: digest::CvStream::seeded(&model_bytes),
    };
    let mut model = validation::resolve(
        decl,
        &mut source,
        &ResolveOptions {
            skip_cv_parse: options.skip_cv_parse,
        },
    )?;
    let (cv_sha1, full_model_sha1) = source.stream.finalize();

    model.digests = Digests {
        schema_sha1: digest::sha1_hex(schema::BUNDLED_SCHEMA),
        model_sha1: digest::sha1_hex(&model_bytes),
        cv_sha1,
        full_model_sha1,
    };
    model.schema_bytes = bytes::Bytes::from_static(schema::BUNDLED_SCHEMA);
    model.source_mtime = mtime;
    Ok(model)
}

/// Reads external CV files relative to the CV directory of a plain load.
struct DirTerms {
    root: PathBuf,
    stream: digest::CvStream,
}

impl validation::TermSource for DirTerms {
    fn terms(&mut self, path: &str) -> anyhow::Result<Vec<models::TermDecl>> {
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            anyhow::bail!("CV path {path:?} must stay within the CV directory");
        }
        let file = File::open(self.root.join(relative))?;
        cvfile::parse(BufReader::new(file), &mut self.stream)
    }
}
