use std::collections::HashMap;
use std::io::BufRead;

use crate::types::Strand;

/// A single parsed record line from a GTF annotation.
///
/// Coordinates:
/// - `start` is 0-based (the file's 1-based start minus one)
/// - `end` is 0-based half-open
#[derive(Debug, Clone, PartialEq)]
pub struct GtfRecord {
    pub chrom: String,
    pub source: String,
    pub feature: String,
    pub start: u32,
    pub end: u32,
    pub score: Option<f32>,
    pub strand: Strand,
    pub frame: Option<u8>,
    pub attributes: HashMap<String, String>,
    pub line_no: u64,
}

impl GtfRecord {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }
}

/// Parsing errors for the annotation stream.
#[derive(Debug)]
pub enum ParseError {
    Io {
        path: String,
        source: std::io::Error,
    },
    MalformedLine {
        line_no: u64,
        line: String,
        problem: String,
    },
    BadCoordinates {
        line_no: u64,
        line: String,
    },
    MissingAttribute {
        line_no: u64,
        key: &'static str,
    },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Io { path, source } => {
                write!(f, "I/O error while reading '{}': {}", path, source)
            }
            ParseError::MalformedLine {
                line_no,
                line,
                problem,
            } => {
                write!(f, "malformed annotation line {}: {}\n{}", line_no, problem, line)
            }
            ParseError::BadCoordinates { line_no, line } => {
                write!(f, "bad coordinates in annotation line {}:\n{}", line_no, line)
            }
            ParseError::MissingAttribute { line_no, key } => {
                write!(f, "annotation line {}: missing required attribute '{}'", line_no, key)
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Low-level streaming parser for GTF files.
///
/// Most users should go through [`crate::annotation::GeneSet`], which builds
/// the full gene collection (and handles the side-car cache) in one step.
pub struct GtfReader<R: BufRead> {
    reader: R,
    buf: String,
    line_no: u64,
}

impl<R: BufRead> GtfReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            line_no: 0,
        }
    }

    /// Returns an iterator over parsed records.
    ///
    /// - Skips blank lines
    /// - Skips comment lines starting with '#'
    pub fn records(mut self) -> impl Iterator<Item = Result<GtfRecord, ParseError>> {
        std::iter::from_fn(move || loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => self.line_no += 1,
                Err(e) => {
                    return Some(Err(ParseError::Io {
                        path: "<reader>".to_string(),
                        source: e,
                    }))
                }
            }

            let line = self.buf.trim_end_matches(['\n', '\r']);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            return Some(parse_record_line(line, self.line_no));
        })
    }
}

/// Parse a single non-comment line into a `GtfRecord`.
///
/// GTF has 9 tab-separated columns:
/// chrom source feature start end score strand frame attributes
pub fn parse_record_line(line: &str, line_no: u64) -> Result<GtfRecord, ParseError> {
    let malformed = |problem: &str| ParseError::MalformedLine {
        line_no,
        line: line.to_string(),
        problem: problem.to_string(),
    };

    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() != 9 {
        return Err(malformed(&format!("expected 9 columns, found {}", cols.len())));
    }

    // Coordinates: input is 1-based inclusive; convert to 0-based half-open
    // [start-1, end)
    let start_1: u64 = cols[3]
        .parse()
        .map_err(|_| ParseError::BadCoordinates { line_no, line: line.to_string() })?;
    let end_1: u64 = cols[4]
        .parse()
        .map_err(|_| ParseError::BadCoordinates { line_no, line: line.to_string() })?;

    if start_1 == 0 || end_1 < start_1 {
        return Err(ParseError::BadCoordinates { line_no, line: line.to_string() });
    }

    let start = (start_1 - 1) as u32;
    let end = end_1 as u32;

    let score = if cols[5] == "." {
        None
    } else {
        Some(cols[5].parse::<f32>().map_err(|_| malformed("unparsable score"))?)
    };

    let strand = match cols[6] {
        "+" => Strand::Plus,
        "-" => Strand::Minus,
        "." | "?" => Strand::Unknown,
        _ => return Err(malformed("unrecognized strand")),
    };

    let frame = if cols[7] == "." {
        None
    } else {
        let fr: u8 = cols[7].parse().map_err(|_| malformed("unparsable frame"))?;
        if fr > 2 {
            return Err(malformed("frame out of range"));
        }
        Some(fr)
    };

    let attributes = parse_attributes(cols[8], line, line_no)?;

    Ok(GtfRecord {
        chrom: cols[0].to_string(),
        source: cols[1].to_string(),
        feature: cols[2].to_string(),
        start,
        end,
        score,
        strand,
        frame,
        attributes,
        line_no,
    })
}

/// Parse the GTF attribute column: `key "value"; key2 "value2";`
///
/// Values are split from keys on the first whitespace and unquoted. A key
/// with no value is a malformed line (downstream grouping depends on the
/// attribute block being intact).
fn parse_attributes(
    s: &str,
    line: &str,
    line_no: u64,
) -> Result<HashMap<String, String>, ParseError> {
    let mut map = HashMap::new();

    for part in s.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut it = part.splitn(2, char::is_whitespace);
        let key = it.next().unwrap_or("").trim();
        let rest = it.next().map(|v| v.trim()).unwrap_or("");
        if key.is_empty() || rest.is_empty() {
            return Err(ParseError::MalformedLine {
                line_no,
                line: line.to_string(),
                problem: format!("attribute '{}' has no value", part),
            });
        }
        map.insert(key.to_string(), unquote(rest));
    }

    Ok(map)
}

fn unquote(v: &str) -> String {
    let v = v.strip_prefix('"').unwrap_or(v);
    let v = v.strip_suffix('"').unwrap_or(v);
    v.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_gtf_line() {
        let line = "chr1\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\"; exon_number \"1\";";
        let rec = parse_record_line(line, 1).unwrap();

        assert_eq!(rec.chrom, "chr1");
        assert_eq!(rec.feature, "exon");
        // 101..150 inclusive -> [100,150)
        assert_eq!(rec.start, 100);
        assert_eq!(rec.end, 150);
        assert_eq!(rec.strand, Strand::Plus);

        assert_eq!(rec.attr("gene_id"), Some("G1"));
        assert_eq!(rec.attr("transcript_id"), Some("T1"));
        assert_eq!(rec.attr("exon_number"), Some("1"));
    }

    #[test]
    fn wrong_column_count_is_fatal() {
        let line = "chr1\tsrc\texon\t101\t150\t.\t+\t.";
        assert!(matches!(
            parse_record_line(line, 7),
            Err(ParseError::MalformedLine { line_no: 7, .. })
        ));
    }

    #[test]
    fn attribute_without_value_is_fatal() {
        let line = "chr1\tsrc\texon\t101\t150\t.\t+\t.\tgene_id;";
        assert!(matches!(
            parse_record_line(line, 1),
            Err(ParseError::MalformedLine { .. })
        ));
    }

    #[test]
    fn zero_start_is_bad_coordinates() {
        let line = "chr1\tsrc\texon\t0\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";";
        assert!(matches!(
            parse_record_line(line, 1),
            Err(ParseError::BadCoordinates { .. })
        ));
    }

    #[test]
    fn streaming_reader_skips_comments_and_blank_lines() {
        let data = "\
#comment
chr1\tsrc\texon\t1\t2\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";

chr1\tsrc\texon\t3\t4\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
";
        let cur = Cursor::new(data.as_bytes());
        let reader = GtfReader::new(cur);

        let recs: Vec<_> = reader.records().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].start, 0);
        assert_eq!(recs[0].end, 2);
        assert_eq!(recs[1].start, 2);
        assert_eq!(recs[1].end, 4);
        assert_eq!(recs[1].line_no, 4);
    }
}
