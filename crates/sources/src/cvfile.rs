use crate::digest::CvStream;
use models::TermDecl;
use std::io::BufRead;

// The line-oriented external CV format, UTF-8:
//
//   #<name> <value>                          metadata
//   #alias key[|alt...]<TAB>name<TAB>k1,k2   alias term (union-of keys)
//   key[|alt...]<TAB>name[<TAB>p1,p2,...]    one term per line
//
// Blank lines are ignored. Unknown metadata is carried past. Every byte
// read, including the newline, feeds the CV digest.

/// Parse an external CV file from |reader|, feeding |digest|.
pub fn parse<R: BufRead>(mut reader: R, digest: &mut CvStream) -> anyhow::Result<Vec<TermDecl>> {
    let mut terms = Vec::new();
    let mut buffer = Vec::new();
    let mut line_number = 0usize;

    loop {
        buffer.clear();
        let read = reader.read_until(b'\n', &mut buffer)?;
        if read == 0 {
            break;
        }
        digest.update(&buffer);
        line_number += 1;

        let line = std::str::from_utf8(&buffer)
            .map_err(|err| anyhow::anyhow!("line {line_number} is not UTF-8: {err}"))?
            .trim_end_matches(['\n', '\r']);

        if line.is_empty() {
            continue;
        }
        if let Some(metadata) = line.strip_prefix('#') {
            if let Some(alias) = metadata.strip_prefix("alias ") {
                terms.push(parse_term(alias, true, line_number)?);
            }
            // Other metadata lines describe the file, not its terms.
            continue;
        }
        terms.push(parse_term(line, false, line_number)?);
    }
    Ok(terms)
}

fn parse_term(line: &str, alias: bool, line_number: usize) -> anyhow::Result<TermDecl> {
    let mut fields = line.split('\t');
    let keys = fields
        .next()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| anyhow::anyhow!("line {line_number} is missing a term key"))?;
    let name = fields.next();
    let parents = fields.next();
    if fields.next().is_some() {
        anyhow::bail!("line {line_number} has more than three fields");
    }

    let mut keys = keys.split('|').map(str::to_string);
    let key = keys.next().expect("split yields at least one part");

    Ok(TermDecl {
        alt_keys: keys.filter(|k| !k.is_empty()).collect(),
        name: name.unwrap_or(&key).to_string(),
        parents: parents
            .map(|p| {
                p.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        alias,
        key,
    })
}

/// Render resolved CV terms back into the external format. Emitted
/// archives regenerate each external CV file from the resolved model.
pub fn render(name: Option<&str>, terms: &[&validation::Term]) -> String {
    let mut out = String::new();
    if let Some(name) = name {
        out.push_str("#name ");
        out.push_str(name);
        out.push('\n');
    }
    for term in terms {
        if term.alias {
            out.push_str("#alias ");
        }
        out.push_str(&term.key);
        for alt in &term.alt_keys {
            out.push('|');
            out.push_str(alt);
        }
        out.push('\t');
        out.push_str(&term.name);
        if !term.parents.is_empty() {
            out.push('\t');
            out.push_str(&term.parents.join(","));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod test {
    use super::{parse, render};
    use crate::digest::{sha1_hex, CvStream};

    const FILE: &str = "#name Tissues\n\nroot\tRoot\nmid|m\tMiddle\troot\n#alias any\tAny\troot,mid\n";

    #[test]
    fn test_parse_terms_and_digest() {
        let mut digest = CvStream::seeded(b"");
        let terms = parse(FILE.as_bytes(), &mut digest).unwrap();

        assert_eq!(terms.len(), 3);
        assert_eq!(terms[0].key, "root");
        assert_eq!(terms[1].key, "mid");
        assert_eq!(terms[1].alt_keys, vec!["m"]);
        assert_eq!(terms[1].name, "Middle");
        assert_eq!(terms[1].parents, vec!["root"]);
        assert!(terms[2].alias);
        assert_eq!(terms[2].parents, vec!["root", "mid"]);

        // Every byte of the file, including newlines, fed the digest.
        let (cv, _) = digest.finalize();
        assert_eq!(cv, sha1_hex(FILE.as_bytes()));
    }

    #[test]
    fn test_render_round_trips() {
        let mut digest = CvStream::seeded(b"");
        let decls = parse(FILE.as_bytes(), &mut digest).unwrap();

        let terms: Vec<validation::Term> = decls
            .iter()
            .map(|d| validation::Term {
                key: d.key.clone(),
                alt_keys: d.alt_keys.clone(),
                name: d.name.clone(),
                parents: d.parents.clone(),
                ancestors: Vec::new(),
                alias: d.alias,
            })
            .collect();
        let rendered = render(Some("Tissues"), &terms.iter().collect::<Vec<_>>());

        let mut digest = CvStream::seeded(b"");
        let reparsed = parse(rendered.as_bytes(), &mut digest).unwrap();
        assert_eq!(reparsed, decls);
    }

    #[test]
    fn test_malformed_line() {
        let mut digest = CvStream::seeded(b"");
        parse("a\tb\tc\td\n".as_bytes(), &mut digest).unwrap_err();
    }
}
