//! Bucket mapping and bucket lists.

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::PathBuf,
};

use hashbrown::HashMap;
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha12Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::Block;

const MAPPING_CONTEXT: &str = "lryao bucket mapping v1";

/// Errors that can occur while mapping circuits to buckets.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum BucketError {
    #[error("expected {expected} evaluated circuits, got {actual}")]
    InvalidEvalCount { expected: usize, actual: usize },
    #[error("circuit {0} is not an evaluated circuit")]
    NotEvaluated(usize),
    #[error("bucket {0} does not exist")]
    InvalidBucket(usize),
    #[error("bucket {0} is full")]
    BucketFull(usize),
    #[error("bucket {bucket} holds {actual} items, expected {expected}")]
    InvalidBucketLen {
        bucket: usize,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] bincode::Error),
}

/// Maps evaluated circuits to `(bucket, slot)` positions.
///
/// The evaluated indices are shuffled with a PRNG keyed by the seed, after which the `i`-th shuffled
/// index goes to bucket `i / B`, slot `i mod B`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketMapping {
    buckets: Vec<Vec<usize>>,
    positions: HashMap<usize, (usize, usize)>,
}

impl BucketMapping {
    /// Creates a new mapping.
    pub fn new(
        eval: &[usize],
        seed: Block,
        buckets: usize,
        bucket_size: usize,
    ) -> Result<Self, BucketError> {
        if eval.len() != buckets * bucket_size {
            return Err(BucketError::InvalidEvalCount {
                expected: buckets * bucket_size,
                actual: eval.len(),
            });
        }

        let mut shuffled = eval.to_vec();
        let mut rng = ChaCha12Rng::from_seed(blake3::derive_key(MAPPING_CONTEXT, seed.as_bytes()));
        shuffled.shuffle(&mut rng);

        let mut positions = HashMap::with_capacity(shuffled.len());
        for (i, index) in shuffled.iter().enumerate() {
            if positions
                .insert(*index, (i / bucket_size, i % bucket_size))
                .is_some()
            {
                return Err(BucketError::InvalidEvalCount {
                    expected: buckets * bucket_size,
                    actual: positions.len(),
                });
            }
        }

        let buckets = shuffled
            .chunks(bucket_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        Ok(Self { buckets, positions })
    }

    /// Returns the number of buckets.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the bucket size.
    pub fn bucket_size(&self) -> usize {
        self.buckets.first().map(|bucket| bucket.len()).unwrap_or(0)
    }

    /// Returns the bucket holding circuit `index`.
    pub fn bucket_of(&self, index: usize) -> Result<usize, BucketError> {
        self.position(index).map(|(bucket, _)| bucket)
    }

    /// Returns the `(bucket, slot)` position of circuit `index`.
    pub fn position(&self, index: usize) -> Result<(usize, usize), BucketError> {
        self.positions
            .get(&index)
            .copied()
            .ok_or(BucketError::NotEvaluated(index))
    }

    /// Returns the circuit indices in a bucket, in slot order.
    pub fn bucket(&self, bucket: usize) -> Result<&[usize], BucketError> {
        self.buckets
            .get(bucket)
            .map(Vec::as_slice)
            .ok_or(BucketError::InvalidBucket(bucket))
    }
}

/// Items grouped into the buckets of a [`BucketMapping`].
#[derive(Debug, Clone)]
pub struct BucketList<T> {
    mapping: BucketMapping,
    buckets: Vec<Vec<T>>,
}

impl<T> BucketList<T> {
    /// Creates an empty list for the mapping.
    pub fn new(mapping: BucketMapping) -> Self {
        let buckets = (0..mapping.num_buckets())
            .map(|_| Vec::with_capacity(mapping.bucket_size()))
            .collect();

        Self { mapping, buckets }
    }

    /// Adds the item of circuit `index` to its bucket.
    ///
    /// Items are appended, so callers add them in ascending circuit order on both sides.
    pub fn add(&mut self, item: T, index: usize) -> Result<(), BucketError> {
        let bucket = self.mapping.bucket_of(index)?;
        let size = self.mapping.bucket_size();
        let items = &mut self.buckets[bucket];

        if items.len() == size {
            return Err(BucketError::BucketFull(bucket));
        }

        items.push(item);

        Ok(())
    }

    /// Returns the mapping.
    pub fn mapping(&self) -> &BucketMapping {
        &self.mapping
    }

    /// Returns the number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if there are no buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Returns a bucket.
    pub fn bucket(&self, bucket: usize) -> Result<&[T], BucketError> {
        self.buckets
            .get(bucket)
            .map(Vec::as_slice)
            .ok_or(BucketError::InvalidBucket(bucket))
    }

    /// Returns a bucket mutably.
    pub fn bucket_mut(&mut self, bucket: usize) -> Result<&mut [T], BucketError> {
        self.buckets
            .get_mut(bucket)
            .map(Vec::as_mut_slice)
            .ok_or(BucketError::InvalidBucket(bucket))
    }

    /// Returns an iterator over the buckets.
    pub fn iter(&self) -> impl Iterator<Item = &[T]> {
        self.buckets.iter().map(Vec::as_slice)
    }

    /// Returns a mutable iterator over the buckets.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut [T]> {
        self.buckets.iter_mut().map(Vec::as_mut_slice)
    }

    /// Checks every bucket is full.
    pub fn check_full(&self) -> Result<(), BucketError> {
        let size = self.mapping.bucket_size();
        for (bucket, items) in self.buckets.iter().enumerate() {
            if items.len() != size {
                return Err(BucketError::InvalidBucketLen {
                    bucket,
                    expected: size,
                    actual: items.len(),
                });
            }
        }

        Ok(())
    }
}

impl<T: Serialize> BucketList<T> {
    /// Writes every bucket to its own file, `{prefix}.{bucket}.cbundle`.
    pub fn save_to_files(&self, prefix: &str) -> Result<(), BucketError> {
        for (bucket, items) in self.buckets.iter().enumerate() {
            let file = BufWriter::new(File::create(bucket_path(prefix, bucket))?);
            bincode::serialize_into(file, items)?;
        }

        tracing::debug!(prefix, buckets = self.buckets.len(), "saved buckets");

        Ok(())
    }
}

/// Reads one bucket written by [`BucketList::save_to_files`].
pub fn load_bucket<T: DeserializeOwned>(prefix: &str, bucket: usize) -> Result<Vec<T>, BucketError> {
    let file = BufReader::new(File::open(bucket_path(prefix, bucket))?);

    Ok(bincode::deserialize_from(file)?)
}

fn bucket_path(prefix: &str, bucket: usize) -> PathBuf {
    PathBuf::from(format!("{prefix}.{bucket}.cbundle"))
}

/// Loads successive buckets from persisted files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketLoader {
    prefix: String,
    next: usize,
}

impl BucketLoader {
    /// Creates a loader starting at bucket 0.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_cursor(prefix, 0)
    }

    /// Creates a loader starting at the given bucket.
    pub fn with_cursor(prefix: impl Into<String>, next: usize) -> Self {
        Self {
            prefix: prefix.into(),
            next,
        }
    }

    /// Returns the id of the next bucket to load.
    pub fn cursor(&self) -> usize {
        self.next
    }

    /// Loads the next bucket, advancing the cursor on success.
    pub fn next_bucket<T: DeserializeOwned>(&mut self) -> Result<Vec<T>, BucketError> {
        let bucket = load_bucket(&self.prefix, self.next)?;
        tracing::debug!(prefix = %self.prefix, bucket = self.next, "loaded bucket");
        self.next += 1;

        Ok(bucket)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rstest::rstest;

    use super::*;

    fn eval_indices(rng: &mut StdRng, total: usize, eval: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = rand::seq::index::sample(rng, total, eval).into_vec();
        indices.sort_unstable();
        indices
    }

    #[rstest]
    #[case(1, 1)]
    #[case(2, 3)]
    #[case(10, 4)]
    #[case(7, 5)]
    fn test_mapping_is_bijection(#[case] buckets: usize, #[case] bucket_size: usize) {
        let mut rng = StdRng::seed_from_u64(0);
        let eval = eval_indices(&mut rng, 3 * buckets * bucket_size, buckets * bucket_size);
        let seed: Block = rng.gen();

        let mapping = BucketMapping::new(&eval, seed, buckets, bucket_size).unwrap();

        let mut seen = HashSet::new();
        for index in &eval {
            let (bucket, slot) = mapping.position(*index).unwrap();
            assert!(bucket < buckets && slot < bucket_size);
            assert!(seen.insert((bucket, slot)));
            assert_eq!(mapping.bucket(bucket).unwrap()[slot], *index);
        }
        assert_eq!(seen.len(), eval.len());

        let again = BucketMapping::new(&eval, seed, buckets, bucket_size).unwrap();
        assert_eq!(again, mapping);
    }

    #[test]
    fn test_mapping_rejects_wrong_count() {
        assert!(matches!(
            BucketMapping::new(&[0, 1, 2], Block::ZERO, 2, 2),
            Err(BucketError::InvalidEvalCount { .. })
        ));
    }

    #[test]
    fn test_bucket_of_rejects_checked_index() {
        let mapping = BucketMapping::new(&[1, 3, 5, 7], Block::ZERO, 2, 2).unwrap();

        assert!(matches!(
            mapping.bucket_of(2),
            Err(BucketError::NotEvaluated(2))
        ));
    }

    #[test]
    fn test_bucket_list_save_load() {
        let mut rng = StdRng::seed_from_u64(0);
        let eval = eval_indices(&mut rng, 12, 6);
        let mapping = BucketMapping::new(&eval, rng.gen(), 3, 2).unwrap();

        let mut list = BucketList::new(mapping);
        for index in &eval {
            list.add(format!("circuit-{index}"), *index).unwrap();
        }
        list.check_full().unwrap();
        assert!(list.add("extra".to_string(), eval[0]).is_err());

        let prefix = std::env::temp_dir()
            .join(format!("lryao-buckets-{}", std::process::id()))
            .to_string_lossy()
            .into_owned();
        list.save_to_files(&prefix).unwrap();

        let mut loader = BucketLoader::new(prefix.clone());
        for bucket in 0..list.len() {
            let loaded: Vec<String> = loader.next_bucket().unwrap();
            assert_eq!(loaded.as_slice(), list.bucket(bucket).unwrap());
            std::fs::remove_file(bucket_path(&prefix, bucket)).unwrap();
        }
        assert_eq!(loader.cursor(), 3);
        assert!(loader.next_bucket::<String>().is_err());
        assert_eq!(loader.cursor(), 3);
    }
}
