//! Tables in and out: expression and binary matrices, module
//! assignments, biclusters and convergence diagnostics.

use crate::bicluster::{Bicluster, Direction};
use crate::inference::ConvergenceDiagnostics;
use matrix_util::common_io::{mkdir, open_buf_writer, read_lines_of_words_delim, write_lines};
use matrix_util::ndarray_io::NamedMatrix;
use ndarray::Array2;
use std::io::Write;

pub const BICLUSTER_COLUMNS: [&str; 7] = [
    "id",
    "avgSNR",
    "n_genes",
    "n_samples",
    "direction",
    "genes",
    "samples",
];

/// Gene x sample expression, tab-separated, optionally gzipped
pub fn read_expression(file: &str) -> anyhow::Result<NamedMatrix<f64>> {
    NamedMatrix::<f64>::from_tsv(file)
}

/// Gene x sample 0/1 matrix
pub fn read_binary_matrix(file: &str) -> anyhow::Result<NamedMatrix<u8>> {
    let ret = NamedMatrix::<u8>::from_tsv(file)?;
    anyhow::ensure!(
        ret.data.iter().all(|&x| x <= 1),
        "{} has entries other than 0 and 1",
        file
    );
    Ok(ret)
}

pub fn write_binary_matrix(mat: &NamedMatrix<u8>, file: &str) -> anyhow::Result<()> {
    mkdir(file)?;
    mat.to_tsv(file)
}

/// 0/1 entries as floating point for the sampler
pub fn binary_to_f64(mat: &NamedMatrix<u8>) -> Array2<f64> {
    mat.data.mapv(|x| x as f64)
}

/// One row of the bicluster table, with names instead of indices
#[derive(Debug, Clone, PartialEq)]
pub struct BiclusterRecord {
    pub id: usize,
    pub avg_snr: f64,
    pub direction: Direction,
    pub genes: Vec<Box<str>>,
    pub samples: Vec<Box<str>>,
}

impl BiclusterRecord {
    pub fn from_bicluster(
        bic: &Bicluster,
        gene_names: &[Box<str>],
        sample_names: &[Box<str>],
    ) -> anyhow::Result<Self> {
        let lookup = |names: &[Box<str>], idx: &[usize], what: &str| {
            idx.iter()
                .map(|&i| {
                    names
                        .get(i)
                        .cloned()
                        .ok_or_else(|| anyhow::anyhow!("{} index {} out of range", what, i))
                })
                .collect::<anyhow::Result<Vec<_>>>()
        };

        Ok(BiclusterRecord {
            id: bic.id,
            avg_snr: bic.avg_snr,
            direction: bic.direction,
            genes: lookup(gene_names, &bic.genes, "gene")?,
            samples: lookup(sample_names, &bic.samples, "sample")?,
        })
    }

    fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.id,
            self.avg_snr,
            self.genes.len(),
            self.samples.len(),
            self.direction,
            self.genes.join(" "),
            self.samples.join(" ")
        )
    }

    fn parse(words: &[Box<str>], line_no: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(
            words.len() == BICLUSTER_COLUMNS.len(),
            "line {}: expected {} columns, found {}",
            line_no,
            BICLUSTER_COLUMNS.len(),
            words.len()
        );

        let split = |s: &str| -> Vec<Box<str>> { s.split_whitespace().map(Box::from).collect() };

        let genes = split(&words[5]);
        let samples = split(&words[6]);
        let n_genes: usize = words[2].parse()?;
        let n_samples: usize = words[3].parse()?;
        anyhow::ensure!(
            n_genes == genes.len() && n_samples == samples.len(),
            "line {}: counts do not match the gene and sample lists",
            line_no
        );

        Ok(BiclusterRecord {
            id: words[0].parse()?,
            avg_snr: words[1].parse()?,
            direction: words[4].parse()?,
            genes,
            samples,
        })
    }
}

/// Write biclusters with a header line, in the given order
pub fn write_bicluster_table(records: &[BiclusterRecord], file: &str) -> anyhow::Result<()> {
    mkdir(file)?;
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(BICLUSTER_COLUMNS.join("\t"));
    lines.extend(records.iter().map(|r| r.to_line()));
    write_lines(&lines, file)
}

/// Read a table written by [`write_bicluster_table`]
pub fn read_bicluster_table(file: &str) -> anyhow::Result<Vec<BiclusterRecord>> {
    let out = read_lines_of_words_delim(file, "\t", 0)?;
    anyhow::ensure!(
        out.header.len() == BICLUSTER_COLUMNS.len()
            && out.header.iter().zip(BICLUSTER_COLUMNS).all(|(h, c)| &**h == c),
        "{} does not have the bicluster header",
        file
    );

    out.lines
        .iter()
        .enumerate()
        .map(|(i, words)| BiclusterRecord::parse(words, i + 2))
        .collect()
}

/// `gene <tab> module`, one line per gene
pub fn write_modules(membership: &[usize], gene_names: &[Box<str>], file: &str) -> anyhow::Result<()> {
    anyhow::ensure!(
        membership.len() == gene_names.len(),
        "{} genes but {} names",
        membership.len(),
        gene_names.len()
    );
    mkdir(file)?;
    let mut lines = vec!["gene\tmodule".to_string()];
    lines.extend(
        gene_names
            .iter()
            .zip(membership)
            .map(|(g, m)| format!("{}\t{}", g, m)),
    );
    write_lines(&lines, file)
}

/// Skipping-gene counts and RMS values per window; the first window
/// has no RMS
pub fn write_convergence_tsv(diag: &ConvergenceDiagnostics, file: &str) -> anyhow::Result<()> {
    mkdir(file)?;
    let mut lines = vec!["window\tskipping_genes\trms".to_string()];
    for (w, &n) in diag.n_skipping_genes.iter().enumerate() {
        let rms = w
            .checked_sub(1)
            .and_then(|i| diag.rms.get(i))
            .map(|r| r.to_string())
            .unwrap_or_else(|| "NA".to_string());
        lines.push(format!("{}\t{}\t{}", w, n, rms));
    }
    write_lines(&lines, file)
}

pub fn write_diagnostics_json(diag: &ConvergenceDiagnostics, file: &str) -> anyhow::Result<()> {
    mkdir(file)?;
    let mut buf = open_buf_writer(file)?;
    serde_json::to_writer_pretty(&mut buf, diag)?;
    writeln!(buf)?;
    buf.flush()?;
    Ok(())
}
