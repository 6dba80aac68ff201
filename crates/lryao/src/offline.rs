//! The offline phase.
//!
//! P2 chooses the probe-resistant matrices of the main and the cheating-recovery circuit. Both
//! parties then run one cut-and-choose per circuit and P1 transfers the extended P2 input keys
//! of every bucket. The outputs are the buckets each party keeps for the online phase.

mod p1;
mod p2;

use lryao_core::{
    bucket::BucketList,
    bundle::{Bundle, LimitedBundle},
    circuit::Party,
    params::ExecutionParameters,
};

pub use p1::OfflineP1;
pub use p2::OfflineP2;

use crate::msg::Matrices;

/// P1's output of the offline phase.
#[derive(Debug)]
pub struct OfflineP1Output {
    /// Buckets of the main circuit.
    pub main: BucketList<Bundle>,
    /// Buckets of the cheating-recovery circuit.
    pub cheating_recovery: BucketList<Bundle>,
}

impl OfflineP1Output {
    /// Writes every bucket to `{prefix}.main.{bucket}.cbundle` and `{prefix}.cr.{bucket}.cbundle`.
    pub fn save(&self, prefix: &str) -> Result<(), crate::P1Error> {
        self.main.save_to_files(&main_prefix(prefix))?;
        self.cheating_recovery.save_to_files(&cheating_recovery_prefix(prefix))?;

        Ok(())
    }
}

/// P2's output of the offline phase.
#[derive(Debug)]
pub struct OfflineP2Output {
    /// Buckets of the main circuit.
    pub main: BucketList<LimitedBundle>,
    /// Buckets of the cheating-recovery circuit.
    pub cheating_recovery: BucketList<LimitedBundle>,
    /// The matrices used to extend P2's inputs.
    pub matrices: Matrices,
}

impl OfflineP2Output {
    /// Writes every bucket like [`OfflineP1Output::save`], and the matrices to
    /// `{prefix}.main.matrix` and `{prefix}.cr.matrix`.
    pub fn save(&self, prefix: &str) -> Result<(), crate::P2Error> {
        self.main.save_to_files(&main_prefix(prefix))?;
        self.cheating_recovery.save_to_files(&cheating_recovery_prefix(prefix))?;
        self.matrices
            .main
            .save_to_file(format!("{}.matrix", main_prefix(prefix)))?;
        self.matrices
            .cheating_recovery
            .save_to_file(format!("{}.matrix", cheating_recovery_prefix(prefix)))?;

        Ok(())
    }
}

/// Returns the file prefix of the main circuit's buckets.
pub fn main_prefix(prefix: &str) -> String {
    format!("{prefix}.main")
}

/// Returns the file prefix of the cheating-recovery circuit's buckets.
pub fn cheating_recovery_prefix(prefix: &str) -> String {
    format!("{prefix}.cr")
}

/// Checks the two executions can be paired bucket by bucket in the online phase.
fn check_params(
    main: &ExecutionParameters,
    cheating_recovery: &ExecutionParameters,
) -> Result<(), String> {
    if main.buckets() != cheating_recovery.buckets() {
        return Err(format!(
            "main and cheating-recovery executions have {} and {} buckets",
            main.buckets(),
            cheating_recovery.buckets()
        ));
    }

    let (main_inputs, recovery_inputs) = (
        main.circuit().input_count(Party::P1),
        cheating_recovery.circuit().input_count(Party::P1),
    );
    if main_inputs != recovery_inputs {
        return Err(format!(
            "cheating-recovery circuit takes {recovery_inputs} P1 inputs, main circuit takes {main_inputs}"
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use lryao_core::{
        bundle::PROOF_LABELS,
        circuits::{adder, unlock_input},
        matrix::{ProbeResistantMatrix, ProbeResistantMatrixBuilder},
    };
    use rand::{rngs::StdRng, SeedableRng};
    use serio::{channel::duplex, SinkExt};

    use super::*;
    use crate::{
        msg::Matrices,
        test_utils::{adder_params, params, run_offline},
        ProtocolConfig,
    };

    #[tokio::test]
    async fn test_offline() {
        let _ = tracing_subscriber::fmt::try_init();

        let config = ProtocolConfig::builder().channels(2).build().unwrap();
        let (p1, p2) = run_offline(config).await;

        for (list, bundles) in [
            (&p2.main, &p1.main),
            (&p2.cheating_recovery, &p1.cheating_recovery),
        ] {
            assert_eq!(list.len(), 2);
            for (limited, bundles) in list.iter().zip(bundles.iter()) {
                assert_eq!(limited.len(), 3);
                for (limited, bundle) in limited.iter().zip(bundles) {
                    assert_eq!(limited.garbled_tables(), bundle.garbled_tables());
                    assert!(limited.y1().is_some());
                    assert!(limited.y1_extended_keys().is_some());
                }
            }
        }

        assert_eq!(p2.matrices.cheating_recovery.n(), PROOF_LABELS);
        assert_eq!(p2.matrices.main.n(), 32);
    }

    #[tokio::test]
    async fn test_placement_mask_differences() {
        let (p1, p2) = run_offline(ProtocolConfig::default()).await;

        for (limited, bundles) in p2.main.iter().zip(p1.main.iter()) {
            for (p, pair) in bundles.windows(2).enumerate() {
                let expected: Vec<bool> = pair[0]
                    .placement_mask()
                    .iter()
                    .zip(pair[1].placement_mask())
                    .map(|(a, b)| a ^ b)
                    .collect();
                assert_eq!(
                    limited[p].placement_mask_difference(),
                    Some(expected.as_slice())
                );
            }
        }
    }

    #[tokio::test]
    async fn test_p1_rejects_extra_matrix_column() {
        let (main, cheating_recovery) = adder_params();
        let mut p1 = OfflineP1::new(main, cheating_recovery, ProtocolConfig::default()).unwrap();
        let (mut io_p1, mut io_p2) = duplex(1024);

        let mut rng = StdRng::seed_from_u64(0);
        let m = ProbeResistantMatrixBuilder::new(32, 8).unwrap().m();
        let matrices = Matrices {
            main: ProbeResistantMatrix::new(vec![vec![true; m + 1]; 32]).unwrap(),
            cheating_recovery: ProbeResistantMatrixBuilder::new(PROOF_LABELS, 8)
                .unwrap()
                .build(&mut rng),
        };
        io_p2.send(matrices).await.unwrap();

        let err = p1.setup(&mut io_p1).await.unwrap_err();
        assert!(err.is_cheat());
    }

    #[test]
    fn test_mismatched_bucket_counts() {
        let main = params(adder(32), 2, 3);
        let cheating_recovery = params(unlock_input(32), 3, 3);

        assert!(OfflineP1::new(main, cheating_recovery, ProtocolConfig::default()).is_err());
    }

    #[test]
    fn test_mismatched_inputs() {
        let main = params(adder(32), 2, 3);
        let cheating_recovery = params(unlock_input(16), 2, 3);

        assert!(check_params(&main, &cheating_recovery).is_err());
    }
}
