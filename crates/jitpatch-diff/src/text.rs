//! Text form of a [`SparseDiff`]: one `<offset> <value>` pair per line,
//! decimal, ascending by offset, no header or footer.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use jitpatch_types::{HarnessError, HarnessResult};

use crate::SparseDiff;

impl SparseDiff {
    pub fn write_to<W: Write>(&self, mut out: W) -> HarnessResult<()> {
        for (offset, value) in self.iter() {
            writeln!(out, "{offset} {value}")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Parse the text form. Blank lines are skipped; anything else that is
    /// not exactly two decimal fields, a value above 255, or a repeated
    /// offset is rejected with its 1-based line number.
    pub fn read_from<R: BufRead>(input: R) -> HarnessResult<Self> {
        let mut diff = SparseDiff::new();
        for (idx, line) in input.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let (offset, value) = parse_line(&line).map_err(|message| HarnessError::Malformed {
                what: "diff",
                line: line_no,
                message,
            })?;
            if diff.insert(offset, value).is_some() {
                return Err(HarnessError::Malformed {
                    what: "diff",
                    line: line_no,
                    message: format!("offset {offset} appears more than once"),
                });
            }
        }
        Ok(diff)
    }

    pub fn to_text(&self) -> String {
        self.iter()
            .map(|(offset, value)| format!("{offset} {value}\n"))
            .collect()
    }

    pub fn save(&self, path: &Path) -> HarnessResult<()> {
        let file = File::create(path)?;
        self.write_to(BufWriter::new(file))?;
        log::info!("wrote {} diff entries to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> HarnessResult<Self> {
        let file = File::open(path)?;
        let diff = Self::read_from(BufReader::new(file))?;
        log::info!("read {} diff entries from {}", diff.len(), path.display());
        Ok(diff)
    }
}

impl std::str::FromStr for SparseDiff {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::read_from(s.as_bytes())
    }
}

fn parse_line(line: &str) -> Result<(usize, u8), String> {
    let mut fields = line.split_whitespace();
    let (Some(offset), Some(value), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(format!("expected `<offset> <value>`, found {line:?}"));
    };
    let offset = offset
        .parse::<usize>()
        .map_err(|e| format!("bad offset {offset:?}: {e}"))?;
    let value = value
        .parse::<u8>()
        .map_err(|e| format!("bad byte value {value:?}: {e}"))?;
    Ok((offset, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jitpatch_types::ErrorKind;

    #[test]
    fn test_text_is_ascending_pairs() {
        let diff: SparseDiff = [(70_000, 3u8), (5, 255u8), (12, 0u8)].into_iter().collect();
        assert_eq!(diff.to_text(), "5 255\n12 0\n70000 3\n");
    }

    #[test]
    fn test_text_matches_written_form() {
        let diff: SparseDiff = [(1, 9u8), (4096, 17u8), (65_535, 200u8)]
            .into_iter()
            .collect();
        let mut written = Vec::new();
        diff.write_to(&mut written).unwrap();
        assert_eq!(diff.to_text().as_bytes(), &written[..]);
    }

    #[test]
    fn test_empty_diff_is_empty_text() {
        assert_eq!(SparseDiff::new().to_text(), "");
        assert!("".parse::<SparseDiff>().unwrap().is_empty());
    }

    #[test]
    fn test_parse_skips_blank_lines() {
        let diff: SparseDiff = "1 2\n\n3 4\n".parse().unwrap();
        assert_eq!(diff.len(), 2);
        assert_eq!(diff.get(3), Some(4));
    }

    #[test]
    fn test_parse_rejects_value_above_byte() {
        let err = "1 2\n4 256\n".parse::<SparseDiff>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(matches!(err, HarnessError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        assert!("1\n".parse::<SparseDiff>().is_err());
        assert!("1 2 3\n".parse::<SparseDiff>().is_err());
        assert!("-1 2\n".parse::<SparseDiff>().is_err());
    }

    #[test]
    fn test_parse_rejects_duplicate_offsets() {
        let err = "7 1\n7 2\n".parse::<SparseDiff>().unwrap_err();
        assert!(err.to_string().contains("more than once"), "{err}");
    }

    #[test]
    fn test_parse_tolerates_extra_spacing() {
        let diff: SparseDiff = "  10\t20  \n".parse().unwrap();
        assert_eq!(diff.get(10), Some(20));
    }
}
