//! Seeded k-means and Gaussian mixtures, backed by `linfa-clustering`.

use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::{GaussianMixtureModel, GmmInitMethod, KMeans};
use ndarray::{Array2, ArrayBase, Data, Ix2};
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct KmeansArgs {
    pub num_clusters: usize,
    pub max_iter: u64,
    pub seed: u64,
}

impl KmeansArgs {
    pub fn with_clusters(num_clusters: usize) -> Self {
        Self {
            num_clusters,
            max_iter: 100,
            seed: 0,
        }
    }

    pub fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }
}

pub trait Kmeans {
    /// One cluster label per column
    fn kmeans_columns(&self, args: &KmeansArgs) -> anyhow::Result<Vec<usize>>;
}

impl<S> Kmeans for ArrayBase<S, Ix2>
where
    S: Data<Elem = f64>,
{
    fn kmeans_columns(&self, args: &KmeansArgs) -> anyhow::Result<Vec<usize>> {
        let n = self.ncols();
        if args.num_clusters < 2 || n < args.num_clusters {
            return Ok(vec![0; n]);
        }

        // k-means++ needs at least two distinct points
        let first = self.column(0);
        if self.columns().into_iter().all(|c| c == first) {
            return Ok(vec![0; n]);
        }

        let dataset = DatasetBase::from(self.t().to_owned());
        let model = KMeans::params_with_rng(args.num_clusters, StdRng::seed_from_u64(args.seed))
            .max_n_iterations(args.max_iter)
            .tolerance(1e-4)
            .fit(&dataset)
            .map_err(|e| anyhow::anyhow!("k-means failed: {}", e))?;

        let labels = model.predict(&dataset);
        Ok(labels.iter().copied().collect())
    }
}

#[derive(Debug, Clone)]
pub struct MixtureArgs {
    pub num_components: usize,
    pub max_iter: u64,
    pub tol: f64,
    /// added to the diagonal of every covariance
    pub reg_covariance: f64,
    pub seed: u64,
}

impl Default for MixtureArgs {
    fn default() -> Self {
        Self {
            num_components: 2,
            max_iter: 300,
            tol: 1e-3,
            reg_covariance: 1e-6,
            seed: 0,
        }
    }
}

/// Fit a Gaussian mixture to the values of `x`, initialized by k-means,
/// and return the most probable component of each value
pub fn mixture_labels_1d(x: &[f64], args: &MixtureArgs) -> anyhow::Result<Vec<usize>> {
    anyhow::ensure!(
        x.len() >= args.num_components,
        "{} values for {} components",
        x.len(),
        args.num_components
    );

    let points = Array2::from_shape_vec((x.len(), 1), x.to_vec())?;
    let dataset = DatasetBase::from(points);

    let gmm = GaussianMixtureModel::params_with_rng(
        args.num_components,
        StdRng::seed_from_u64(args.seed),
    )
    .init_method(GmmInitMethod::KMeans)
    .max_n_iterations(args.max_iter)
    .tolerance(args.tol)
    .reg_covariance(args.reg_covariance)
    .fit(&dataset)
    .map_err(|e| anyhow::anyhow!("mixture fit failed: {}", e))?;

    let labels = gmm.predict(&dataset);
    Ok(labels.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn separated_columns_split_in_two() -> anyhow::Result<()> {
        let mat = array![
            [0.0, 0.1, 0.2, 10.0, 10.1, 10.2],
            [0.0, 0.1, 0.0, 10.0, 10.1, 10.2],
        ];
        let labels = mat.kmeans_columns(&KmeansArgs::with_clusters(2))?;
        assert_eq!(labels.len(), 6);
        assert!(labels[..3].iter().all(|&l| l == labels[0]));
        assert!(labels[3..].iter().all(|&l| l == labels[3]));
        assert_ne!(labels[0], labels[3]);
        Ok(())
    }

    #[test]
    fn same_seed_same_labels() -> anyhow::Result<()> {
        // three evenly spaced groups: either two-way split is a local optimum
        let mat = Array2::from_shape_fn((2, 30), |(_, j)| (j / 10) as f64 * 5.0);
        let args = KmeansArgs::with_clusters(2).seed(7);
        let first = mat.kmeans_columns(&args)?;
        for _ in 0..20 {
            assert_eq!(mat.kmeans_columns(&args)?, first);
        }
        Ok(())
    }

    #[test]
    fn degenerate_requests_give_one_cluster() -> anyhow::Result<()> {
        let mat = array![[1.0, 2.0, 3.0]];
        assert_eq!(mat.kmeans_columns(&KmeansArgs::with_clusters(1))?, vec![0; 3]);
        assert_eq!(mat.kmeans_columns(&KmeansArgs::with_clusters(5))?, vec![0; 3]);

        let flat = array![[2.0, 2.0, 2.0, 2.0]];
        assert_eq!(flat.kmeans_columns(&KmeansArgs::with_clusters(2))?, vec![0; 4]);

        let empty: Array2<f64> = Array2::zeros((2, 0));
        assert!(empty.kmeans_columns(&KmeansArgs::with_clusters(2))?.is_empty());
        Ok(())
    }

    #[test]
    fn mixture_separates_two_modes() -> anyhow::Result<()> {
        let x: Vec<f64> = (0..42)
            .map(|i| {
                let jitter = ((i * 37) % 11) as f64 / 100.0;
                if i < 12 {
                    jitter
                } else {
                    5.0 + jitter
                }
            })
            .collect();

        let labels = mixture_labels_1d(&x, &MixtureArgs::default())?;
        assert!(labels[..12].iter().all(|&l| l == labels[0]));
        assert!(labels[12..].iter().all(|&l| l == labels[12]));
        assert_ne!(labels[0], labels[12]);

        assert_eq!(mixture_labels_1d(&x, &MixtureArgs::default())?, labels);
        assert!(mixture_labels_1d(&[1.0], &MixtureArgs::default()).is_err());
        Ok(())
    }
}
