//! Incremental CSV record reader (RFC 4180 quoting).
//!
//! Reads one physical line at a time from a [`BufRead`] and only keeps the
//! record currently being assembled in memory. Quoted fields may contain
//! commas, doubled quotes and line breaks.

use std::io::BufRead;

use crate::error::{Error, Result};

/// One logical CSV record and the line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
  pub line:   u64,
  pub fields: Vec<String>,
}

impl RawRecord {
  /// Field `index`, trimmed; empty or missing fields read as `None`.
  pub fn field(&self, index: usize) -> Option<&str> {
    self
      .fields
      .get(index)
      .map(|f| f.trim())
      .filter(|f| !f.is_empty())
  }
}

pub struct RecordReader<R> {
  inner: R,
  /// Physical lines consumed so far.
  line:  u64,
  buf:   Vec<u8>,
}

impl<R: BufRead> RecordReader<R> {
  pub fn new(inner: R) -> Self {
    Self {
      inner,
      line: 0,
      buf: Vec::new(),
    }
  }

  /// Read the next record. Blank lines between records are skipped.
  ///
  /// A quoted field left open at end of input yields
  /// [`Error::MalformedRow`]; the following call returns `Ok(None)`. A record
  /// containing bytes that are not UTF-8 is read to its end and then reported
  /// as [`Error::MalformedRow`].
  pub fn next_record(&mut self) -> Result<Option<RawRecord>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut start_line = None;
    let mut invalid_utf8 = false;

    loop {
      self.buf.clear();
      let read = self
        .inner
        .read_until(b'\n', &mut self.buf)
        .map_err(|source| Error::Read { line: self.line + 1, source })?;

      if read == 0 {
        return match start_line {
          Some(line) => Err(Error::MalformedRow {
            line,
            reason: "unterminated quoted field".to_string(),
          }),
          None => Ok(None),
        };
      }
      self.line += 1;

      let decoded = match std::str::from_utf8(&self.buf) {
        Ok(text) => std::borrow::Cow::Borrowed(text),
        Err(_) => {
          invalid_utf8 = true;
          String::from_utf8_lossy(&self.buf)
        }
      };
      let mut text: &str = &decoded;
      text = text.strip_suffix('\n').unwrap_or(text);
      text = text.strip_suffix('\r').unwrap_or(text);
      if self.line == 1 {
        text = text.strip_prefix('\u{feff}').unwrap_or(text);
      }

      if start_line.is_none() {
        if text.trim().is_empty() {
          continue;
        }
        start_line = Some(self.line);
      }

      let mut chars = text.chars().peekable();
      while let Some(c) = chars.next() {
        if in_quotes {
          if c == '"' {
            if chars.peek() == Some(&'"') {
              chars.next();
              field.push('"');
            } else {
              in_quotes = false;
            }
          } else {
            field.push(c);
          }
        } else {
          match c {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
          }
        }
      }

      if in_quotes {
        // The quoted field continues on the next physical line.
        field.push('\n');
        continue;
      }

      let line = start_line.unwrap_or(self.line);
      if invalid_utf8 {
        return Err(Error::MalformedRow {
          line,
          reason: "invalid UTF-8".to_string(),
        });
      }
      fields.push(field);
      return Ok(Some(RawRecord { line, fields }));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn read_all(input: &str) -> Vec<Result<RawRecord>> {
    let mut reader = RecordReader::new(input.as_bytes());
    let mut out = Vec::new();
    loop {
      match reader.next_record() {
        Ok(Some(r)) => out.push(Ok(r)),
        Ok(None) => break,
        Err(e) => out.push(Err(e)),
      }
    }
    out
  }

  #[test]
  fn splits_plain_fields() {
    let records = read_all("a,b,c\n1,2,3\n");
    assert_eq!(records.len(), 2);
    let second = records[1].as_ref().unwrap();
    assert_eq!(second.fields, vec!["1", "2", "3"]);
    assert_eq!(second.line, 2);
  }

  #[test]
  fn handles_quotes_commas_and_crlf() {
    let records = read_all("\"Crows, Jays\",\"say \"\"caw\"\"\",x\r\n");
    let r = records[0].as_ref().unwrap();
    assert_eq!(r.fields, vec!["Crows, Jays", "say \"caw\"", "x"]);
  }

  #[test]
  fn quoted_field_spans_lines() {
    let records = read_all("code,range\nabc,\"north\nand south\"\nxyz,east\n");
    assert_eq!(records.len(), 3);
    let r = records[1].as_ref().unwrap();
    assert_eq!(r.fields[1], "north\nand south");
    assert_eq!(r.line, 2);
    assert_eq!(records[2].as_ref().unwrap().line, 4);
  }

  #[test]
  fn skips_blank_lines_and_bom() {
    let records = read_all("\u{feff}h1,h2\n\n\nv1,v2");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].as_ref().unwrap().fields[0], "h1");
    assert_eq!(records[1].as_ref().unwrap().fields, vec!["v1", "v2"]);
  }

  #[test]
  fn unterminated_quote_is_a_row_error() {
    let records = read_all("a,b\n1,\"open\n");
    assert_eq!(records.len(), 2);
    let err = records[1].as_ref().unwrap_err();
    assert!(err.is_row_error());
  }

  #[test]
  fn invalid_utf8_fails_only_its_record() {
    let input: &[u8] = b"a,b\nx,\"Nebelkr\xE4he\nspans\"\ny,ok\n";
    let mut reader = RecordReader::new(input);
    assert_eq!(reader.next_record().unwrap().unwrap().fields, vec!["a", "b"]);

    let err = reader.next_record().unwrap_err();
    assert!(err.is_row_error());
    assert!(matches!(err, Error::MalformedRow { line: 2, .. }));

    let next = reader.next_record().unwrap().unwrap();
    assert_eq!(next.fields, vec!["y", "ok"]);
    assert_eq!(next.line, 4);
    assert!(reader.next_record().unwrap().is_none());
  }

  #[test]
  fn field_accessor_trims_and_drops_empty() {
    let r = RawRecord {
      line:   1,
      fields: vec![" x ".into(), "".into()],
    };
    assert_eq!(r.field(0), Some("x"));
    assert_eq!(r.field(1), None);
    assert_eq!(r.field(7), None);
  }
}
