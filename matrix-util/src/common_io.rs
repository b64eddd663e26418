//! Line-oriented text I/O, transparently gzipped by file extension.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Either a literal separator string or a set of separator characters
pub enum Delimiter {
    Str(String),
    Chars(Vec<char>),
}

impl From<&str> for Delimiter {
    fn from(s: &str) -> Self {
        Delimiter::Str(s.to_string())
    }
}

impl From<Vec<char>> for Delimiter {
    fn from(chars: Vec<char>) -> Self {
        Delimiter::Chars(chars)
    }
}

impl<const N: usize> From<&[char; N]> for Delimiter {
    fn from(chars: &[char; N]) -> Self {
        Delimiter::Chars(chars.to_vec())
    }
}

impl Delimiter {
    fn split_words(&self, line: &str) -> Vec<Box<str>> {
        match self {
            Delimiter::Str(s) => line.split(s.as_str()).map(Box::from).collect(),
            Delimiter::Chars(chars) => line.split(chars.as_slice()).map(Box::from).collect(),
        }
    }
}

fn is_gz(file: &str) -> bool {
    Path::new(file).extension().and_then(|x| x.to_str()) == Some("gz")
}

/// Buffered reader over a plain or `.gz` file
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(input_file)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", input_file, e))?;
    if is_gz(input_file) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Buffered writer to a plain or `.gz` file; `stdout` and `stderr`
/// name the standard streams
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    if output_file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }
    if output_file.eq_ignore_ascii_case("stderr") {
        return Ok(Box::new(BufWriter::new(std::io::stderr())));
    }

    let file = File::create(output_file)
        .map_err(|e| anyhow::anyhow!("failed to create {}: {}", output_file, e))?;
    if is_gz(output_file) {
        let encoder = GzEncoder::new(file, flate2::Compression::default());
        Ok(Box::new(BufWriter::new(encoder)))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

///
/// Write one line per item
///
/// * `lines` - anything printable
/// * `output_file` - file name--either gzipped or not
///
pub fn write_lines<T>(lines: &[T], output_file: &str) -> anyhow::Result<()>
where
    T: std::fmt::Display,
{
    let mut buf = open_buf_writer(output_file)?;
    for line in lines {
        match writeln!(buf, "{}", line) {
            Ok(()) => {}
            // a closed pipe downstream is not an error
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
            Err(e) => return Err(anyhow::anyhow!("failed to write {}: {}", output_file, e)),
        }
    }
    buf.flush()?;
    Ok(())
}

pub struct ReadLinesOut<T: Send> {
    pub lines: Vec<Vec<T>>,
    pub header: Vec<Box<str>>,
}

fn is_data_line(line: &str) -> bool {
    !(line.starts_with('#') || line.starts_with('%') || line.trim().is_empty())
}

///
/// Read a (gzipped) text file, skipping comment (`#`, `%`) and blank
/// lines, and parse every remaining line with `parse_fn`. Lines are
/// parsed in parallel but come back in file order.
///
/// * `input_file` - file name--either gzipped or not
/// * `hdr_line` - index of the header among the data lines (-1 = none)
/// * `parse_header_fn` - splits the header line
/// * `parse_fn` - parses each body line
///
pub fn read_lines_of_words_generic<T>(
    input_file: &str,
    hdr_line: i64,
    parse_header_fn: impl Fn(&str) -> Vec<Box<str>> + Sync,
    parse_fn: impl Fn(&str) -> Vec<T> + Sync,
) -> anyhow::Result<ReadLinesOut<T>>
where
    T: Send,
{
    let mut data_lines: Vec<Box<str>> = vec![];
    for line in open_buf_reader(input_file)?.lines() {
        let line = line?;
        if is_data_line(&line) {
            data_lines.push(line.into_boxed_str());
        }
    }

    let (header, body) = match usize::try_from(hdr_line) {
        Ok(h) if h < data_lines.len() => (parse_header_fn(&data_lines[h]), &data_lines[(h + 1)..]),
        Ok(_) => return Err(anyhow::anyhow!("no header line in {}", input_file)),
        Err(_) => (vec![], &data_lines[..]),
    };

    let lines = body.par_iter().map(|s| parse_fn(s)).collect();

    Ok(ReadLinesOut { lines, header })
}

///
/// Read lines and split them into words
///
/// * `input_file` - file name--either gzipped or not
/// * `delim` - delimiter
/// * `hdr_line` - index of the header among the data lines (-1 = none)
///
pub fn read_lines_of_words_delim(
    input_file: &str,
    delim: impl Into<Delimiter>,
    hdr_line: i64,
) -> anyhow::Result<ReadLinesOut<Box<str>>> {
    let delim = delim.into();
    let split = |line: &str| delim.split_words(line);
    read_lines_of_words_generic(input_file, hdr_line, split, split)
}

/// Create the parent directory of `file` if needed
pub fn mkdir(file: &str) -> anyhow::Result<()> {
    match Path::new(file).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(std::fs::create_dir_all(dir)?),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_header_are_skipped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("x.txt.gz");
        let file = file.to_str().unwrap();

        write_lines(&["# comment", "a b", "", "1 2", "% other", "3 4"], file)?;
        let out = read_lines_of_words_delim(file, " ", 0)?;
        assert_eq!(out.header, vec![Box::from("a"), Box::from("b")]);
        assert_eq!(out.lines.len(), 2);
        assert_eq!(&*out.lines[1][0], "3");

        let out = read_lines_of_words_delim(file, &[' '], -1)?;
        assert!(out.header.is_empty());
        assert_eq!(out.lines.len(), 3);

        assert!(read_lines_of_words_delim(file, " ", 5).is_err());
        Ok(())
    }
}
