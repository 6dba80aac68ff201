use std::{mem, sync::Arc};

use enum_try_as_inner::EnumTryAsInner;
use lryao_core::{
    bucket::BucketList,
    bundle::{BundleBuilder, LimitedBundle, PROOF_LABELS},
    circuit::Party,
    matrix::ProbeResistantMatrixBuilder,
    params::ExecutionParameters,
    Block,
};
use serio::{IoDuplex, SinkExt};

use super::{check_params, OfflineP2Output};
use crate::{
    msg::Matrices, offline_ot::receive_keys, ot::OTReceiver, verifier::CutAndChooseVerifier,
    P2Error, ProtocolConfig,
};

#[derive(Debug, EnumTryAsInner)]
#[derive_err(Debug)]
enum State {
    Initialized,
    Setup(Setup),
    Checked(Checked),
    Complete(OfflineP2Output),
    Error,
}

impl State {
    fn take(&mut self) -> Self {
        mem::replace(self, State::Error)
    }
}

impl From<StateError> for P2Error {
    fn from(err: StateError) -> Self {
        P2Error::state(err)
    }
}

#[derive(Debug)]
struct Setup {
    matrices: Matrices,
    main: BundleBuilder,
    cheating_recovery: BundleBuilder,
}

#[derive(Debug)]
struct Checked {
    matrices: Matrices,
    main: BucketList<LimitedBundle>,
    cheating_recovery: BucketList<LimitedBundle>,
}

/// P2 of the offline phase.
#[derive(Debug)]
pub struct OfflineP2 {
    config: ProtocolConfig,
    main: ExecutionParameters,
    cheating_recovery: ExecutionParameters,
    state: State,
}

impl OfflineP2 {
    /// Creates a new P2.
    ///
    /// Both executions must have the same number of buckets.
    pub fn new(
        main: ExecutionParameters,
        cheating_recovery: ExecutionParameters,
        config: ProtocolConfig,
    ) -> Result<Self, P2Error> {
        check_params(&main, &cheating_recovery).map_err(P2Error::config)?;

        Ok(Self {
            config,
            main,
            cheating_recovery,
            state: State::Initialized,
        })
    }

    /// Chooses the matrices and sends them to P1.
    #[tracing::instrument(skip_all)]
    pub async fn setup<Io>(&mut self, io: &mut Io) -> Result<(), P2Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        self.state.take().try_into_initialized()?;

        let s = self.main.statistical_parameter();
        let main_builder =
            ProbeResistantMatrixBuilder::new(self.main.circuit().input_count(Party::P2), s)?;
        let recovery_builder = ProbeResistantMatrixBuilder::new(
            PROOF_LABELS,
            self.cheating_recovery.statistical_parameter(),
        )?;

        let matrices = {
            let mut rng = rand::thread_rng();
            Matrices {
                main: main_builder.build(&mut rng),
                cheating_recovery: recovery_builder.build(&mut rng),
            }
        };
        tracing::debug!(
            main = matrices.main.m(),
            cheating_recovery = matrices.cheating_recovery.m(),
            "extended input lengths"
        );

        io.send(matrices.clone()).await?;

        let main = BundleBuilder::new(
            self.main.circuit().clone(),
            Arc::new(matrices.main.clone()),
        )?;
        // Nothing P2 checks depends on the proof of cheating.
        let cheating_recovery = BundleBuilder::cheating_recovery(
            self.cheating_recovery.circuit().clone(),
            Arc::new(matrices.cheating_recovery.clone()),
            Block::ZERO,
        )?;

        self.state = State::Setup(Setup {
            matrices,
            main,
            cheating_recovery,
        });

        Ok(())
    }

    /// Checks P1's circuits of the main circuit, then of the cheating-recovery circuit.
    #[tracing::instrument(skip_all)]
    pub async fn cut_and_choose<Io>(&mut self, channels: &mut [Io]) -> Result<(), P2Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        let Setup {
            matrices,
            main,
            cheating_recovery,
        } = self.state.take().try_into_setup()?;

        let main = CutAndChooseVerifier::new(self.main.clone(), main, self.config.clone())
            .execute(channels)
            .await?;
        tracing::info!(buckets = main.len(), "main circuits verified");

        let cheating_recovery = CutAndChooseVerifier::new(
            self.cheating_recovery.clone(),
            cheating_recovery,
            self.config.clone(),
        )
        .execute(channels)
        .await?;
        tracing::info!(
            buckets = cheating_recovery.len(),
            "cheating-recovery circuits verified"
        );

        self.state = State::Checked(Checked {
            matrices,
            main,
            cheating_recovery,
        });

        Ok(())
    }

    /// Receives the extended input keys of a random input for every bucket of both circuits.
    #[tracing::instrument(skip_all)]
    pub async fn transfer<Io, OT>(&mut self, io: &mut Io, ot: &mut OT) -> Result<(), P2Error>
    where
        Io: IoDuplex + Unpin + Send,
        OT: OTReceiver<Io> + Send,
    {
        let Checked {
            matrices,
            mut main,
            mut cheating_recovery,
        } = self.state.take().try_into_checked()?;

        receive_keys(io, ot, &mut main, &matrices.main).await?;
        receive_keys(io, ot, &mut cheating_recovery, &matrices.cheating_recovery).await?;

        self.state = State::Complete(OfflineP2Output {
            main,
            cheating_recovery,
            matrices,
        });

        Ok(())
    }

    /// Returns the buckets and matrices kept for the online phase.
    pub fn finalize(mut self) -> Result<OfflineP2Output, P2Error> {
        Ok(self.state.take().try_into_complete()?)
    }

    /// Runs the whole offline phase.
    pub async fn run<Io, OT>(
        mut self,
        channels: &mut [Io],
        ot: &mut OT,
    ) -> Result<OfflineP2Output, P2Error>
    where
        Io: IoDuplex + Unpin + Send,
        OT: OTReceiver<Io> + Send,
    {
        let Some(io) = channels.first_mut() else {
            return Err(P2Error::config("no channels"));
        };
        self.setup(io).await?;

        self.cut_and_choose(channels).await?;

        self.transfer(&mut channels[0], ot).await?;

        self.finalize()
    }
}
