//! The online phase.
//!
//! Each input pair consumes one bucket of the main circuit and one bucket of the
//! cheating-recovery circuit. P2 evaluates the main bucket. If two of its circuits disagree in a
//! way that reveals P1's proof of cheating, P2 feeds the proof to the cheating-recovery bucket and
//! learns P1's input. P2 runs the cheating-recovery step in every execution, with a random guess
//! when no proof was found, so P1 cannot tell whether it was caught.

use std::sync::Arc;

use lryao_core::{
    bundle::{Bundle, LimitedBundle},
    circuit::{Circuit, Party},
    compute::{EvaluationInstance, EvaluationResult, MajorityCompute, OnlineCompute},
    evaluation::{EvaluationPackage, OpenedCircuit},
    Block, CheatError,
};
use serio::{stream::IoStreamExt, IoDuplex, SinkExt};

use crate::{msg::Matrices, P1Error, P2Error, ProtocolConfig};

/// P2's output of one online execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineOutput {
    /// Result of evaluating the main bucket.
    pub result: EvaluationResult,
    /// The function output, if P2 could determine it.
    ///
    /// When P1 was caught cheating this is computed in the clear from P1's recovered input.
    pub output: Option<Vec<bool>>,
}

/// P1 of the online phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnlineP1;

impl OnlineP1 {
    /// Creates a new P1.
    pub fn new() -> Self {
        Self
    }

    /// Sends the openings of the main bucket for input `x`.
    #[tracing::instrument(skip_all)]
    pub async fn evaluate<Io>(
        &self,
        io: &mut Io,
        bucket: &[Bundle],
        proof_of_cheating: Block,
        x: &[bool],
    ) -> Result<(), P1Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        let d2: Vec<bool> = io.expect_next().await?;

        let package = EvaluationPackage::build(
            bucket,
            x,
            &d2,
            Some(proof_of_cheating),
            &mut rand::thread_rng(),
        )?;
        io.send(package).await?;

        Ok(())
    }

    /// Sends the openings of the cheating-recovery bucket for input `x`.
    #[tracing::instrument(skip_all)]
    pub async fn recover<Io>(
        &self,
        io: &mut Io,
        bucket: &[Bundle],
        x: &[bool],
    ) -> Result<(), P1Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        let d2: Vec<bool> = io.expect_next().await?;

        let package = EvaluationPackage::build(bucket, x, &d2, None, &mut rand::thread_rng())?;
        io.send(package).await?;

        Ok(())
    }

    /// Runs one online execution over a main bucket and a cheating-recovery bucket.
    pub async fn run<Io>(
        &self,
        io: &mut Io,
        main: &[Bundle],
        cheating_recovery: &[Bundle],
        x: &[bool],
    ) -> Result<(), P1Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        let proof_of_cheating = cheating_recovery
            .first()
            .and_then(Bundle::proof_of_cheating)
            .ok_or_else(|| P1Error::state("bucket is not a cheating-recovery bucket"))?;

        self.evaluate(io, main, proof_of_cheating, x).await?;
        self.recover(io, cheating_recovery, x).await?;

        tracing::debug!("online execution complete");

        Ok(())
    }
}

/// P2 of the online phase.
#[derive(Debug, Clone)]
pub struct OnlineP2 {
    main: Arc<Circuit>,
    cheating_recovery: Arc<Circuit>,
    matrices: Matrices,
    config: ProtocolConfig,
}

impl OnlineP2 {
    /// Creates a new P2.
    ///
    /// # Arguments
    ///
    /// * `main` - The main circuit.
    /// * `cheating_recovery` - The cheating-recovery circuit.
    /// * `matrices` - The matrices chosen in the offline phase.
    /// * `config` - The protocol configuration.
    pub fn new(
        main: Arc<Circuit>,
        cheating_recovery: Arc<Circuit>,
        matrices: Matrices,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            main,
            cheating_recovery,
            matrices,
            config,
        }
    }

    /// Evaluates the main bucket on input `y`.
    #[tracing::instrument(skip_all)]
    pub async fn evaluate<Io>(
        &self,
        io: &mut Io,
        bucket: &[LimitedBundle],
        y: &[bool],
    ) -> Result<EvaluationResult, P2Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        let expected = self.main.input_count(Party::P2);
        if y.len() != expected {
            return Err(P2Error::input(format!(
                "expected {expected} input bits, got {}",
                y.len()
            )));
        }

        let d2 = masked_input(bucket, y)?;
        io.send(d2.clone()).await?;

        let package: EvaluationPackage = io.expect_next().await?;
        let Some(ciphers) = package.proof.as_ref() else {
            return Err(CheatError::new("main bucket package has no proof ciphers").into());
        };
        let opened = package.open(bucket, &self.matrices.main, &d2)?;

        let result = OnlineCompute::new(
            &self.main,
            instances(bucket, &opened, OpenedCircuit::inputs),
            ciphers,
            self.config.threads(),
        )?
        .compute();

        match &result {
            EvaluationResult::FoundProofOfCheating(_) => {
                tracing::warn!("found proof of cheating")
            }
            EvaluationResult::InvalidWireFound => {
                tracing::warn!("no circuit of the bucket produced a valid output")
            }
            EvaluationResult::ValidOutput(_) => tracing::debug!("main bucket evaluated"),
        }

        Ok(result)
    }

    /// Evaluates the cheating-recovery bucket with `guess` as the proof of cheating.
    ///
    /// Returns P1's input if the guess is the proof.
    #[tracing::instrument(skip_all)]
    pub async fn recover<Io>(
        &self,
        io: &mut Io,
        bucket: &[LimitedBundle],
        guess: Block,
    ) -> Result<EvaluationResult, P2Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        let d2 = masked_input(bucket, &guess.to_bits())?;
        io.send(d2.clone()).await?;

        let package: EvaluationPackage = io.expect_next().await?;
        let opened = package.open(bucket, &self.matrices.cheating_recovery, &d2)?;

        Ok(MajorityCompute::new(
            &self.cheating_recovery,
            instances(bucket, &opened, OpenedCircuit::recovery_inputs),
            self.config.threads(),
        )
        .compute())
    }

    /// Runs one online execution over a main bucket and a cheating-recovery bucket.
    pub async fn run<Io>(
        &self,
        io: &mut Io,
        main: &[LimitedBundle],
        cheating_recovery: &[LimitedBundle],
        y: &[bool],
    ) -> Result<OnlineOutput, P2Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        let result = self.evaluate(io, main, y).await?;

        let guess = match result {
            EvaluationResult::FoundProofOfCheating(proof) => proof,
            _ => Block::random(&mut rand::thread_rng()),
        };
        let recovered = self.recover(io, cheating_recovery, guess).await?;

        let output = match (&result, recovered) {
            (EvaluationResult::ValidOutput(output), _) => Some(output.clone()),
            (EvaluationResult::FoundProofOfCheating(_), EvaluationResult::ValidOutput(x)) => {
                tracing::info!("recovered P1's input");
                Some(self.main.evaluate(&x, y)?)
            }
            _ => None,
        };

        Ok(OnlineOutput { result, output })
    }
}

/// Masks `input` with the random input P2 used in the offline transfer of `bucket`.
fn masked_input(bucket: &[LimitedBundle], input: &[bool]) -> Result<Vec<bool>, P2Error> {
    let y1 = bucket
        .first()
        .and_then(LimitedBundle::y1)
        .ok_or_else(|| P2Error::state("bucket has no transferred input keys"))?;

    if y1.len() != input.len() {
        return Err(P2Error::state(format!(
            "bucket was prepared for {} input bits, got {}",
            y1.len(),
            input.len()
        )));
    }

    Ok(input.iter().zip(y1).map(|(a, b)| a ^ b).collect())
}

fn instances<'a>(
    bucket: &'a [LimitedBundle],
    opened: &'a [OpenedCircuit],
    inputs: fn(&OpenedCircuit) -> Vec<Block>,
) -> Vec<EvaluationInstance<'a>> {
    bucket
        .iter()
        .zip(opened)
        .map(|(bundle, opened)| EvaluationInstance {
            tables: bundle.garbled_tables(),
            translation_table: bundle.translation_table(),
            inputs: inputs(opened),
            output_keys: Some(&opened.output_keys),
        })
        .collect()
}
