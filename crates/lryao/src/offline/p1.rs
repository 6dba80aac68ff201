use std::{mem, sync::Arc};

use enum_try_as_inner::EnumTryAsInner;
use lryao_core::{
    bundle::{BundleBuilder, PROOF_LABELS},
    circuit::Party,
    matrix::ProbeResistantMatrixBuilder,
    params::ExecutionParameters,
    Block, CheatError,
};
use serio::{stream::IoStreamExt, IoDuplex};

use super::{check_params, OfflineP1Output};
use crate::{
    msg::Matrices, offline_ot::send_keys, ot::OTSender, prover::CutAndChooseProver, P1Error,
    ProtocolConfig,
};

#[derive(Debug, EnumTryAsInner)]
#[derive_err(Debug)]
enum State {
    Initialized,
    Setup(Setup),
    Garbled(OfflineP1Output),
    Complete(OfflineP1Output),
    Error,
}

impl State {
    fn take(&mut self) -> Self {
        mem::replace(self, State::Error)
    }
}

impl From<StateError> for P1Error {
    fn from(err: StateError) -> Self {
        P1Error::state(err)
    }
}

#[derive(Debug)]
struct Setup {
    main: BundleBuilder,
    cheating_recovery: BundleBuilder,
}

/// P1 of the offline phase.
#[derive(Debug)]
pub struct OfflineP1 {
    config: ProtocolConfig,
    main: ExecutionParameters,
    cheating_recovery: ExecutionParameters,
    state: State,
}

impl OfflineP1 {
    /// Creates a new P1.
    ///
    /// # Arguments
    ///
    /// * `main` - Parameters of the main circuit.
    /// * `cheating_recovery` - Parameters of the cheating-recovery circuit, with as many buckets as
    ///   the main circuit.
    /// * `config` - The protocol configuration.
    pub fn new(
        main: ExecutionParameters,
        cheating_recovery: ExecutionParameters,
        config: ProtocolConfig,
    ) -> Result<Self, P1Error> {
        check_params(&main, &cheating_recovery).map_err(P1Error::config)?;

        Ok(Self {
            config,
            main,
            cheating_recovery,
            state: State::Initialized,
        })
    }

    /// Receives P2's matrices and picks the proof of cheating.
    #[tracing::instrument(skip_all)]
    pub async fn setup<Io>(&mut self, io: &mut Io) -> Result<(), P1Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        self.state.take().try_into_initialized()?;

        let Matrices {
            main,
            cheating_recovery,
        } = io.expect_next().await?;

        let p2_inputs = self.main.circuit().input_count(Party::P2);
        if main.n() != p2_inputs || cheating_recovery.n() != PROOF_LABELS {
            return Err(CheatError::new(format!(
                "matrices have {} and {} rows, expected {p2_inputs} and {PROOF_LABELS}",
                main.n(),
                cheating_recovery.n()
            ))
            .into());
        }

        let expected_m = (
            ProbeResistantMatrixBuilder::new(p2_inputs, self.main.statistical_parameter())?.m(),
            ProbeResistantMatrixBuilder::new(
                PROOF_LABELS,
                self.cheating_recovery.statistical_parameter(),
            )?
            .m(),
        );
        if (main.m(), cheating_recovery.m()) != expected_m {
            return Err(CheatError::new(format!(
                "matrices have {} and {} columns, expected {} and {}",
                main.m(),
                cheating_recovery.m(),
                expected_m.0,
                expected_m.1
            ))
            .into());
        }

        let proof_of_cheating = Block::random(&mut rand::thread_rng());

        self.state = State::Setup(Setup {
            main: BundleBuilder::new(self.main.circuit().clone(), Arc::new(main))?,
            cheating_recovery: BundleBuilder::cheating_recovery(
                self.cheating_recovery.circuit().clone(),
                Arc::new(cheating_recovery),
                proof_of_cheating,
            )?,
        });

        Ok(())
    }

    /// Runs the cut-and-choose of the main circuit, then of the cheating-recovery circuit.
    #[tracing::instrument(skip_all)]
    pub async fn cut_and_choose<Io>(&mut self, channels: &mut [Io]) -> Result<(), P1Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        let Setup {
            main,
            cheating_recovery,
        } = self.state.take().try_into_setup()?;

        let main = CutAndChooseProver::new(self.main.clone(), main, self.config.clone())
            .execute(channels)
            .await?;
        tracing::info!(buckets = main.len(), "main cut-and-choose complete");

        let cheating_recovery = CutAndChooseProver::new(
            self.cheating_recovery.clone(),
            cheating_recovery,
            self.config.clone(),
        )
        .execute(channels)
        .await?;
        tracing::info!(
            buckets = cheating_recovery.len(),
            "cheating-recovery cut-and-choose complete"
        );

        self.state = State::Garbled(OfflineP1Output {
            main,
            cheating_recovery,
        });

        Ok(())
    }

    /// Transfers P2's extended input keys for every bucket of both circuits.
    #[tracing::instrument(skip_all)]
    pub async fn transfer<Io, OT>(&mut self, io: &mut Io, ot: &mut OT) -> Result<(), P1Error>
    where
        Io: IoDuplex + Unpin + Send,
        OT: OTSender<Io> + Send,
    {
        let output = self.state.take().try_into_garbled()?;

        send_keys(io, ot, &output.main).await?;
        send_keys(io, ot, &output.cheating_recovery).await?;

        self.state = State::Complete(output);

        Ok(())
    }

    /// Returns the buckets kept for the online phase.
    pub fn finalize(mut self) -> Result<OfflineP1Output, P1Error> {
        Ok(self.state.take().try_into_complete()?)
    }

    /// Runs the whole offline phase.
    ///
    /// Every message other than the garbled circuits goes over the first channel.
    pub async fn run<Io, OT>(
        mut self,
        channels: &mut [Io],
        ot: &mut OT,
    ) -> Result<OfflineP1Output, P1Error>
    where
        Io: IoDuplex + Unpin + Send,
        OT: OTSender<Io> + Send,
    {
        let Some(io) = channels.first_mut() else {
            return Err(P1Error::config("no channels"));
        };
        self.setup(io).await?;

        self.cut_and_choose(channels).await?;

        self.transfer(&mut channels[0], ot).await?;

        self.finalize()
    }
}
