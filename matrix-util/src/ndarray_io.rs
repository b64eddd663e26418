use crate::common_io::{read_lines_of_words_delim, write_lines, Delimiter};
use ndarray::prelude::*;
use rayon::prelude::*;
use std::fmt::{Debug, Display};
use std::str::FromStr;

fn parse_words<T>(words: &[Box<str>], line_no: usize) -> anyhow::Result<Vec<T>>
where
    T: FromStr,
    <T as FromStr>::Err: Debug,
{
    words
        .iter()
        .map(|w| {
            w.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("line {}: failed to parse `{}`: {:?}", line_no, w, e))
        })
        .collect()
}

fn stack_rows<T>(rows: Vec<Vec<T>>) -> anyhow::Result<Array2<T>> {
    let nrows = rows.len();
    let ncols = rows.first().map(|x| x.len()).unwrap_or(0);
    if let Some(bad) = rows.iter().position(|r| r.len() != ncols) {
        return Err(anyhow::anyhow!(
            "row {} has {} columns, expected {}",
            bad,
            rows[bad].len(),
            ncols
        ));
    }
    let data: Vec<T> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((nrows, ncols), data)?)
}

/// A dense matrix with named rows and columns, stored as a text table:
///
/// ```text
/// <corner>  col_1  col_2  ...
/// row_1     x_11   x_12   ...
/// row_2     x_21   x_22   ...
/// ```
///
/// The corner cell of the header is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedMatrix<T> {
    pub row_names: Vec<Box<str>>,
    pub column_names: Vec<Box<str>>,
    pub data: Array2<T>,
}

impl<T> NamedMatrix<T>
where
    T: FromStr + Send + Sync + Display + Clone,
    <T as FromStr>::Err: Debug,
{
    pub fn new(
        row_names: Vec<Box<str>>,
        column_names: Vec<Box<str>>,
        data: Array2<T>,
    ) -> anyhow::Result<Self> {
        if data.nrows() != row_names.len() || data.ncols() != column_names.len() {
            return Err(anyhow::anyhow!(
                "{} x {} names for a {} x {} matrix",
                row_names.len(),
                column_names.len(),
                data.nrows(),
                data.ncols()
            ));
        }
        Ok(Self {
            row_names,
            column_names,
            data,
        })
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    /// Read a tab-separated named matrix (optionally gzipped)
    pub fn from_tsv(file: &str) -> anyhow::Result<Self> {
        Self::read_file_delim(file, "\t")
    }

    pub fn read_file_delim(file: &str, delim: impl Into<Delimiter>) -> anyhow::Result<Self> {
        let out = read_lines_of_words_delim(file, delim, 0)?;

        if out.lines.is_empty() {
            return Err(anyhow::anyhow!("No data in file {}", file));
        }

        let ncols = out.lines[0].len().saturating_sub(1);

        let mut column_names = out.header;
        if column_names.len() == ncols + 1 {
            column_names.remove(0); // corner cell
        }
        if column_names.len() != ncols {
            return Err(anyhow::anyhow!(
                "header has {} names, but rows have {} values",
                column_names.len(),
                ncols
            ));
        }

        let parsed = out
            .lines
            .par_iter()
            .enumerate()
            .map(|(i, words)| -> anyhow::Result<(Box<str>, Vec<T>)> {
                let (name, values) = words
                    .split_first()
                    .ok_or_else(|| anyhow::anyhow!("line {}: empty", i + 1))?;
                Ok((name.clone(), parse_words::<T>(values, i + 1)?))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let (row_names, rows): (Vec<_>, Vec<_>) = parsed.into_iter().unzip();

        Self::new(row_names, column_names, stack_rows(rows)?)
    }

    /// Write a tab-separated named matrix (gzipped if the file name ends with `.gz`)
    pub fn to_tsv(&self, file: &str) -> anyhow::Result<()> {
        let mut lines: Vec<Box<str>> = Vec::with_capacity(self.nrows() + 1);
        let mut hdr = vec!["".to_string()];
        hdr.extend(self.column_names.iter().map(|x| x.to_string()));
        lines.push(hdr.join("\t").into_boxed_str());

        for (name, row) in self.row_names.iter().zip(self.data.rows()) {
            let mut words = vec![name.to_string()];
            words.extend(row.iter().map(|x| format!("{}", x)));
            lines.push(words.join("\t").into_boxed_str());
        }
        write_lines(&lines, file)
    }

    /// Keep the rows at `rows` in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            row_names: rows.iter().map(|&i| self.row_names[i].clone()).collect(),
            column_names: self.column_names.clone(),
            data: self.data.select(Axis(0), rows),
        }
    }
}
