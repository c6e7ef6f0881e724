use crate::digest::{self, CvStream};
use crate::errors::LoadError;
use crate::{cvfile, emit, reader};
use indexmap::IndexMap;
use models::{CvSourceDecl, TermDecl};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::time::SystemTime;
use time::OffsetDateTime;
use validation::{CvState, Digests, Model, ResolveOptions};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const MODEL_MEMBER: &str = "bp-model.xml";
pub const SCHEMA_MEMBER: &str = "bp-schema.xsd";
pub const SIGNATURES_MEMBER: &str = "signatures.txt";
pub const CV_DIR: &str = "cv/";

// Manifest keys, in their fixed order.
const SIGNATURE_KEYS: [&str; 3] = ["schemaSHA1", "modelSHA1", "cvSHA1"];

/// True if |path| starts with the ZIP local-file magic.
pub fn is_zip(path: &Path) -> std::io::Result<bool> {
    let mut magic = [0u8; 4];
    match File::open(path)?.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == b"PK\x03\x04"),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err),
    }
}

/// Load a packaged model archive, verifying every manifest digest
/// against its computed counterpart.
pub fn load_package(path: &Path, options: &crate::LoadOptions) -> Result<Model, LoadError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;

    let schema_bytes = read_member(&mut archive, SCHEMA_MEMBER)?;
    let model_bytes = read_member(&mut archive, MODEL_MEMBER)?;
    let manifest = parse_signatures(&read_member(&mut archive, SIGNATURES_MEMBER)?)?;

    let mtime = archive
        .by_name(MODEL_MEMBER)?
        .last_modified()
        .and_then(|dt| OffsetDateTime::try_from(dt).ok())
        .map(SystemTime::from);

    let decl = reader::read(&model_bytes)?;

    let mut source = ZipTerms {
        archive: &mut archive,
        stream: CvStream::seeded(&model_bytes),
    };
    let mut model = validation::resolve(
        decl,
        &mut source,
        &ResolveOptions {
            skip_cv_parse: options.skip_cv_parse,
        },
    )?;
    let (cv_sha1, full_model_sha1) = source.stream.finalize();

    let digests = Digests {
        schema_sha1: digest::sha1_hex(&schema_bytes),
        model_sha1: digest::sha1_hex(&model_bytes),
        cv_sha1,
        full_model_sha1,
    };

    // The cv digest stream is intentionally partial under skipCVparse,
    // so only the schema and model digests are comparable.
    let comparable: &[(&str, &str)] = if options.skip_cv_parse {
        &[
            ("schemaSHA1", &digests.schema_sha1),
            ("modelSHA1", &digests.model_sha1),
        ]
    } else {
        &[
            ("schemaSHA1", &digests.schema_sha1),
            ("modelSHA1", &digests.model_sha1),
            ("cvSHA1", &digests.cv_sha1),
        ]
    };
    for (key, computed) in comparable {
        let expected = manifest.get(*key).ok_or_else(|| {
            LoadError::corrupt(format!("signatures manifest is missing {key}"))
        })?;
        if expected != computed {
            return Err(LoadError::corrupt(format!(
                "{key} mismatch: manifest has {expected}, computed {computed}"
            )));
        }
    }

    model.digests = digests;
    model.schema_bytes = bytes::Bytes::from(schema_bytes);
    model.source_mtime = mtime;
    Ok(model)
}

struct ZipTerms<'a> {
    archive: &'a mut ZipArchive<File>,
    stream: CvStream,
}

impl validation::TermSource for ZipTerms<'_> {
    fn terms(&mut self, path: &str) -> anyhow::Result<Vec<TermDecl>> {
        if path.contains('/') || path.contains('\\') {
            anyhow::bail!("archive CV path {path:?} is not flat");
        }
        let member = self.archive.by_name(&[CV_DIR, path].concat())?;
        cvfile::parse(BufReader::new(member), &mut self.stream)
    }
}

fn read_member(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>, LoadError> {
    let mut member = archive
        .by_name(name)
        .map_err(|_| LoadError::corrupt(format!("archive is missing member {name}")))?;
    let mut bytes = Vec::with_capacity(member.size() as usize);
    member.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn parse_signatures(bytes: &[u8]) -> Result<IndexMap<String, String>, LoadError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| LoadError::corrupt("signatures manifest is not UTF-8"))?;

    let mut manifest = IndexMap::new();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(": ").ok_or_else(|| {
            LoadError::corrupt(format!("malformed signature line {line:?}"))
        })?;
        manifest.insert(key.to_string(), value.to_string());
    }
    Ok(manifest)
}

fn render_signatures(digests: &Digests) -> String {
    let values = [
        &digests.schema_sha1,
        &digests.model_sha1,
        &digests.cv_sha1,
    ];
    SIGNATURE_KEYS
        .iter()
        .zip(values)
        .map(|(key, value)| format!("{key}: {value}\n"))
        .collect()
}

/// Write |model| as a packaged archive at |out|. External CV files are
/// regenerated from the resolved model under flat `cv/` names; the
/// signatures manifest is written last.
pub fn write_package(model: &Model, out: &Path) -> Result<(), LoadError> {
    // Rewrite each external CV path to a flat, collision-free member
    // name. Candidates are lowercased so emitted archives are identical
    // on case-insensitive filesystems.
    let mut decl = model.decl.clone();
    let mut taken = HashSet::new();
    for cv_decl in &mut decl.cvs {
        if let CvSourceDecl::File { path } = &mut cv_decl.source {
            *path = flatten(path, &mut taken);
        }
    }

    let model_bytes = emit::model_xml(&decl).map_err(LoadError::Emit)?;

    let deflate =
        || SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut zip = ZipWriter::new(File::create(out)?);

    // The model member carries the source document's mtime.
    let mut model_options = deflate();
    if let Some(mtime) = model.source_mtime {
        if let Ok(dt) = zip::DateTime::try_from(OffsetDateTime::from(mtime)) {
            model_options = model_options.last_modified_time(dt);
        }
    }
    zip.start_file(MODEL_MEMBER, model_options)?;
    zip.write_all(&model_bytes)?;

    zip.start_file(SCHEMA_MEMBER, deflate())?;
    zip.write_all(&model.schema_bytes)?;

    // CV members in declaration order; their bytes as written are the
    // archive's cv digest stream.
    let mut stream = CvStream::seeded(&model_bytes);
    for cv_decl in &decl.cvs {
        let CvSourceDecl::File { path } = &cv_decl.source else {
            continue;
        };
        let id = cv_decl.id.as_ref().expect("registered CVs carry an id");
        let cv = model.cvs.must_get(id)?;
        if !matches!(cv.state, CvState::Resolved { .. }) {
            return Err(validation::Error::CvUnresolved {
                cv: cv.label().to_string(),
            }
            .into());
        }
        let content = cvfile::render(cv.name.as_deref(), &cv.terms(&model.cvs));
        stream.update(content.as_bytes());

        zip.start_file([CV_DIR, path].concat(), deflate())?;
        zip.write_all(content.as_bytes())?;
    }
    let (cv_sha1, full_model_sha1) = stream.finalize();

    let digests = Digests {
        schema_sha1: digest::sha1_hex(&model.schema_bytes),
        model_sha1: digest::sha1_hex(&model_bytes),
        cv_sha1,
        full_model_sha1,
    };
    zip.start_file(SIGNATURES_MEMBER, deflate())?;
    zip.write_all(render_signatures(&digests).as_bytes())?;

    zip.finish()?;
    tracing::info!(out = %out.display(), model = %digests.model_sha1, "wrote packaged model");
    Ok(())
}

// Flat, lowercase, collision-free member name for a CV path. Collisions
// take a monotonically increasing counter ahead of the extension.
fn flatten(path: &str, taken: &mut HashSet<String>) -> String {
    let base = path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_ascii_lowercase();
    let (stem, ext) = match base.rfind('.') {
        Some(dot) if dot > 0 => base.split_at(dot),
        _ => (base.as_str(), ""),
    };

    let mut candidate = base.clone();
    let mut counter = 1u32;
    while taken.contains(&candidate) {
        candidate = format!("{stem}-{counter}{ext}");
        counter += 1;
    }
    taken.insert(candidate.clone());
    candidate
}
