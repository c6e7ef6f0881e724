use models::Usage;
use std::io::Write;

// A model exercising every registry: collections with indices, inline and
// external and URI CVs, a meta-CV, compound types, a concept-type chain,
// weak-entity identification, a cross-domain related concept, and a
// filename pattern.
const MODEL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bp-model project="exposome" schemaVer="1.4" metadataCollection="metadata">
  <annotations>
    <annot name="maintainer">data-office</annot>
  </annotations>
  <collections>
    <collection name="metadata" path="db.metadata"/>
    <collection name="samples" path="db.samples">
      <index unique="true">
        <attr name="donor_id"/>
        <attr name="id"/>
      </index>
      <index>
        <attr name="tissue" ord="-1"/>
      </index>
    </collection>
    <collection name="labs" path="db.labs"/>
  </collections>
  <null-values>
    <term key="NA" name="Not available"/>
    <term key="NP" name="Not provided"/>
  </null-values>
  <patterns>
    <pattern name="accession">^[A-Z]{2}[0-9]{6}$</pattern>
  </patterns>
  <cvs>
    <cv id="tissue" name="Tissue types">
      <description>Controlled tissue nomenclature.</description>
      <term key="root" name="Root"/>
      <term key="mid" name="Middle" parents="root"/>
      <term key="leaf" name="Leaf" parents="mid"/>
    </cv>
    <cv id="diseases" name="Diseases">
      <file path="diseases.cv"/>
    </cv>
    <cv id="go" name="Gene ontology">
      <uri>http://example.org/go.obo</uri>
    </cv>
    <meta-cv id="anatomy">
      <cv-ref id="tissue"/>
      <cv-ref id="diseases"/>
    </meta-cv>
  </cvs>
  <compound-types>
    <compound-type name="range">
      <column name="lo"><column-type type="decimal" use="required"/></column>
      <column name="hi"><column-type type="decimal" use="required"/></column>
    </compound-type>
  </compound-types>
  <concept-types>
    <concept-type name="audited" collection="samples">
      <concept-type>
        <column name="created"><column-type type="timestamp" use="required"/></column>
      </concept-type>
      <column name="created"><column-type type="timestamp" use="desirable"/></column>
    </concept-type>
  </concept-types>
  <concept-domains>
    <concept-domain name="lab" fullname="Laboratories">
      <concept name="site" collection="labs">
        <column name="id"><column-type type="string" use="idref" pattern="accession"/></column>
        <column name="city"><column-type type="string" use="optional"/></column>
      </concept>
    </concept-domain>
    <concept-domain name="s" fullname="Samples">
      <description>Donors and their samples.</description>
      <concept name="donor">
        <column name="id"><column-type type="string" use="idref"/></column>
        <column name="sex"><column-type type="string" use="required"/></column>
      </concept>
      <concept name="sample" basedOn="audited" identifiedBy="donor" idPrefix="donor_" collection="samples">
        <column name="id"><column-type type="string" use="idref"/></column>
        <column name="tissue"><column-type type="string" use="required" cv="tissue"/></column>
        <column name="aliquots"><column-type type="integer" use="optional" arraySeps=","/></column>
        <column name="ph"><column-type type="compound" use="optional" compound="range"/></column>
        <related-concept domain="lab" concept="site" keyPrefix="lab_" arity="0..1"/>
      </concept>
    </concept-domain>
  </concept-domains>
  <filename-patterns>
    <filename-pattern name="raw" domain="s" concept="sample">
      <literal>sample_</literal>
      <capture name="id" type="string" column="id"/>
      <literal>_L</literal>
      <capture name="lane" type="integer" column="aliquots"/>
      <literal>.txt</literal>
    </filename-pattern>
  </filename-patterns>
</bp-model>
"#;

const DISEASES: &str = "#name Diseases\nhealthy\tHealthy\nill|sick\tIll\nflu\tInfluenza\till\n";

fn write_fixture(dir: &std::path::Path) -> std::path::PathBuf {
    let model_path = dir.join("bp-model.xml");
    std::fs::write(&model_path, MODEL).unwrap();
    std::fs::write(dir.join("diseases.cv"), DISEASES).unwrap();
    model_path
}

fn load_fixture(dir: &tempfile::TempDir) -> validation::Model {
    let path = write_fixture(dir.path());
    sources::load(path, &sources::LoadOptions::default()).unwrap()
}

#[test]
fn test_plain_load_minimal() {
    // One domain, one concept, two columns, in declaration order.
    let minimal = r#"<bp-model project="min" schemaVer="1.0">
  <null-values><term key="NA"/></null-values>
  <concept-domains>
    <concept-domain name="s">
      <concept name="sample">
        <column name="id"><column-type type="string" use="idref"/></column>
        <column name="name"><column-type type="string" use="required"/></column>
      </concept>
    </concept-domain>
  </concept-domains>
</bp-model>"#;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bp-model.xml");
    std::fs::write(&path, minimal).unwrap();

    let model = sources::load(&path, &sources::LoadOptions::default()).unwrap();

    let concept = model.domains.get("s").unwrap().concepts.get("sample").unwrap();
    let keys: Vec<_> = concept.columns.keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, vec!["id", "name"]);

    // modelSHA1 is the digest of the file bytes exactly as stored.
    let mut hasher = <sha1::Sha1 as sha1::Digest>::new();
    sha1::Digest::update(&mut hasher, minimal.as_bytes());
    let expected = hex::encode(sha1::Digest::finalize(hasher));
    assert_eq!(model.digests.model_sha1, expected);
}

#[test]
fn test_full_model_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let model = load_fixture(&dir);

    // Weak-entity identification, concept-type basing, and the
    // cross-domain foreign key, all in deterministic merge order.
    let sample = model.domains.get("s").unwrap().concepts.get("sample").unwrap();
    let keys: Vec<_> = sample.columns.keys().map(|k| k.as_str()).collect();
    assert_eq!(
        keys,
        vec!["created", "donor_id", "id", "tissue", "aliquots", "ph", "lab_id"]
    );

    // The concept-type chain applied its widening override.
    assert_eq!(
        sample.columns.get("created").unwrap().column_type.usage,
        Usage::Desirable
    );

    // Weak-entity import keeps identity and records provenance.
    let donor_id = sample.columns.get("donor_id").unwrap();
    assert_eq!(donor_id.column_type.usage, Usage::IdRef);
    assert_eq!(donor_id.reference.as_ref().unwrap().column.as_str(), "id");

    // The foreign key cleared idref and carries its restriction.
    let lab_id = sample.columns.get("lab_id").unwrap();
    assert_eq!(lab_id.column_type.usage, Usage::Required);
    assert!(matches!(
        lab_id.column_type.restriction,
        Some(models::Restriction::Pattern(_))
    ));
    let resolved = sample.related[0].resolved.as_ref().unwrap();
    assert_eq!(resolved.domain.as_str(), "lab");
    assert_eq!(resolved.columns.len(), 1);

    // External CV terms resolved with their ancestor closure.
    let diseases = model.cvs.get("diseases").unwrap();
    assert!(diseases.contains("sick", &model.cvs).unwrap());
    let flu = diseases
        .terms(&model.cvs)
        .into_iter()
        .find(|t| t.key == "flu")
        .unwrap();
    assert_eq!(flu.ancestors, vec!["ill"]);

    // The meta-CV unions its members in order.
    let anatomy = model.cvs.get("anatomy").unwrap();
    assert!(anatomy.contains("leaf", &model.cvs).unwrap());
    assert!(anatomy.contains("healthy", &model.cvs).unwrap());
    assert!(!anatomy.contains("unknown", &model.cvs).unwrap());

    // URI-referenced CVs stay unresolved and say so on use.
    let go = model.cvs.get("go").unwrap();
    assert!(matches!(
        go.contains("anything", &model.cvs),
        Err(validation::Error::CvUnresolved { .. })
    ));

    // The null CV occupies its dedicated slot.
    assert!(model.is_valid_null("NA"));
    assert!(!model.is_valid_null("na"));
}

#[test]
fn test_filename_pattern_matching() {
    let dir = tempfile::tempdir().unwrap();
    let model = load_fixture(&dir);

    let matches = model.match_concept("/data/in/sample_AB12_L003.txt");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].concept.as_str(), "sample");
    assert_eq!(matches[0].mapped.get("id"), Some(&serde_json::json!("AB12")));
    assert_eq!(matches[0].mapped.get("aliquots"), Some(&serde_json::json!(3)));
    assert_eq!(matches[0].extracted.get("lane").map(String::as_str), Some("003"));

    assert!(model.match_concept("unrelated.bin").is_empty());
}

#[test]
fn test_record_validation_faults() {
    let dir = tempfile::tempdir().unwrap();
    let model = load_fixture(&dir);

    let mut record = indexmap::IndexMap::new();
    record.insert("donor_id".to_string(), "d1".to_string());
    record.insert("id".to_string(), "s1".to_string());
    record.insert("created".to_string(), "2024-02-01T10:00:00Z".to_string());
    record.insert("tissue".to_string(), "leaf".to_string());
    record.insert("aliquots".to_string(), "1,2,3".to_string());
    record.insert("lab_id".to_string(), "AB123456".to_string());
    assert!(model.validate_record("s", "sample", &record).unwrap().is_empty());

    // A CV miss, a primitive mismatch inside an array, and a pattern miss.
    record.insert("tissue".to_string(), "bark".to_string());
    record.insert("aliquots".to_string(), "1,x,3".to_string());
    record.insert("lab_id".to_string(), "nope".to_string());
    let faults = model.validate_record("s", "sample", &record).unwrap();
    let kinds: Vec<_> = faults.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            validation::FaultKind::NotInCv,
            validation::FaultKind::BadPrimitive,
            validation::FaultKind::PatternMismatch,
        ]
    );

    // Null sentinels pass optionals but fail required columns.
    record.insert("tissue".to_string(), "NA".to_string());
    record.insert("aliquots".to_string(), "NA".to_string());
    record.insert("lab_id".to_string(), "AB123456".to_string());
    let faults = model.validate_record("s", "sample", &record).unwrap();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].kind, validation::FaultKind::NullInRequired);
    assert_eq!(faults[0].column.as_str(), "tissue");
}

#[test]
fn test_packaged_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let plain = load_fixture(&dir);

    let archive_path = dir.path().join("model.bpz");
    sources::write_package(&plain, &archive_path).unwrap();

    let packaged = sources::load(&archive_path, &sources::LoadOptions::default()).unwrap();

    // Structural equality across the round trip, declaration order
    // included.
    assert_eq!(plain, packaged);

    // Flat cv/ member names: no separators inside the rewritten path.
    let file = std::fs::File::open(&archive_path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert!(names.contains(&"bp-model.xml".to_string()));
    assert!(names.contains(&"bp-schema.xsd".to_string()));
    assert!(names.contains(&"signatures.txt".to_string()));
    let cv_members: Vec<_> = names.iter().filter(|n| n.starts_with("cv/")).collect();
    assert_eq!(cv_members.len(), 1);
    assert!(!cv_members[0]["cv/".len()..].contains('/'));

    // The manifest digests match the freshly computed ones.
    assert_eq!(packaged.digests.schema_sha1, plain.digests.schema_sha1);
    assert!(!packaged.digests.model_sha1.is_empty());

    // Loading the same archive twice is digest-stable.
    let again = sources::load(&archive_path, &sources::LoadOptions::default()).unwrap();
    assert_eq!(again.digests, packaged.digests);
}

#[test]
fn test_tampered_archive_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let plain = load_fixture(&dir);

    let archive_path = dir.path().join("model.bpz");
    sources::write_package(&plain, &archive_path).unwrap();

    // Rewrite the archive, replacing the CV member's content while
    // keeping the stale signatures manifest.
    let tampered_path = dir.path().join("tampered.bpz");
    let mut archive = zip::ZipArchive::new(std::fs::File::open(&archive_path).unwrap()).unwrap();
    let mut writer = zip::ZipWriter::new(std::fs::File::create(&tampered_path).unwrap());
    for i in 0..archive.len() {
        let mut member = archive.by_index(i).unwrap();
        let name = member.name().to_string();
        let mut content = Vec::new();
        std::io::Read::read_to_end(&mut member, &mut content).unwrap();
        if name.starts_with("cv/") {
            content.extend_from_slice(b"tampered\tTampered\n");
        }
        writer
            .start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&content).unwrap();
    }
    writer.finish().unwrap();

    let err = sources::load(&tampered_path, &sources::LoadOptions::default()).unwrap_err();
    assert!(matches!(err, sources::LoadError::CorruptArchive { .. }), "{err}");
}

#[test]
fn test_digest_stability_across_load_paths() {
    // The cv and full-model digests depend only on the bytes read, not
    // on whether they came from a directory or an archive: repack the
    // original bytes into an archive and compare.
    let dir = tempfile::tempdir().unwrap();
    let model_path = write_fixture(dir.path());
    let plain = sources::load(&model_path, &sources::LoadOptions::default()).unwrap();

    let archive_path = dir.path().join("byhand.bpz");
    let mut writer = zip::ZipWriter::new(std::fs::File::create(&archive_path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    // The plain model references diseases.cv without a directory part,
    // so the same document works packaged.
    writer.start_file("bp-model.xml", options).unwrap();
    writer.write_all(MODEL.as_bytes()).unwrap();
    writer.start_file("bp-schema.xsd", options).unwrap();
    writer.write_all(sources::BUNDLED_SCHEMA).unwrap();
    writer.start_file("cv/diseases.cv", options).unwrap();
    writer.write_all(DISEASES.as_bytes()).unwrap();
    writer.start_file("signatures.txt", options).unwrap();
    writer
        .write_all(
            format!(
                "schemaSHA1: {}\nmodelSHA1: {}\ncvSHA1: {}\n",
                plain.digests.schema_sha1, plain.digests.model_sha1, plain.digests.cv_sha1
            )
            .as_bytes(),
        )
        .unwrap();
    writer.finish().unwrap();

    let packaged = sources::load(&archive_path, &sources::LoadOptions::default()).unwrap();
    assert_eq!(packaged.digests, plain.digests);
    assert_eq!(packaged, plain);
}

#[test]
fn test_skip_cv_parse_leaves_files_unresolved() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path());

    let options = sources::LoadOptions {
        skip_cv_parse: true,
        ..Default::default()
    };
    let model = sources::load(&path, &options).unwrap();

    let diseases = model.cvs.get("diseases").unwrap();
    assert!(matches!(
        diseases.contains("ill", &model.cvs),
        Err(validation::Error::CvUnresolved { .. })
    ));
    // Inline CVs still resolve.
    assert!(model.cvs.get("tissue").unwrap().contains("leaf", &model.cvs).unwrap());
}

#[test]
fn test_schema_violations_name_their_location() {
    let dir = tempfile::tempdir().unwrap();
    let bad = r#"<bp-model project="p" schemaVer="1.0">
  <null-values><term key="NA"/></null-values>
  <concept-domains>
    <concept-domain name="s">
      <concept name="c">
        <column name="x"><column-type type="nonsense" use="required"/></column>
      </concept>
    </concept-domain>
  </concept-domains>
</bp-model>"#;
    let path = dir.path().join("bp-model.xml");
    std::fs::write(&path, bad).unwrap();

    let err = sources::load(&path, &sources::LoadOptions::default()).unwrap_err();
    let text = err.to_string();
    assert!(matches!(err, sources::LoadError::SchemaViolation { .. }), "{text}");
    assert!(text.contains("concept[c]"), "{text}");
    assert!(text.contains("nonsense"), "{text}");
}

#[test]
fn test_duplicate_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let bad = r#"<bp-model project="p" schemaVer="1.0">
  <null-values><term key="NA"/></null-values>
  <concept-domains>
    <concept-domain name="s"><concept name="c"/></concept-domain>
    <concept-domain name="s"/>
  </concept-domains>
</bp-model>"#;
    let path = dir.path().join("bp-model.xml");
    std::fs::write(&path, bad).unwrap();

    let err = sources::load(&path, &sources::LoadOptions::default()).unwrap_err();
    assert!(
        matches!(
            err,
            sources::LoadError::Resolve(validation::Error::DuplicateName { .. })
        ),
        "{err}"
    );
}
