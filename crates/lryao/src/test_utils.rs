use std::sync::Arc;

use lryao_core::{
    circuit::Circuit,
    circuits::{adder, unlock_input},
    params::ExecutionParameters,
};
use serio::channel::{duplex, MemoryDuplex};

use crate::{
    ot::ideal::ideal_ot, OfflineP1, OfflineP1Output, OfflineP2, OfflineP2Output, ProtocolConfig,
    ProtocolError,
};

pub(crate) fn params(circuit: Circuit, buckets: usize, bucket_size: usize) -> ExecutionParameters {
    ExecutionParameters::builder()
        .circuit(Arc::new(circuit))
        .buckets(buckets)
        .bucket_size(bucket_size)
        .statistical_parameter(8)
        .eval_probability(0.75)
        .build()
        .unwrap()
}

/// Parameters of a 32-bit adder with its cheating-recovery circuit, two buckets of three.
pub(crate) fn adder_params() -> (ExecutionParameters, ExecutionParameters) {
    (params(adder(32), 2, 3), params(unlock_input(32), 2, 3))
}

pub(crate) fn channels(count: usize) -> (Vec<MemoryDuplex>, Vec<MemoryDuplex>) {
    (0..count).map(|_| duplex(1024)).unzip()
}

pub(crate) async fn run_offline(config: ProtocolConfig) -> (OfflineP1Output, OfflineP2Output) {
    let (main, cheating_recovery) = adder_params();

    let p1 = OfflineP1::new(main.clone(), cheating_recovery.clone(), config.clone()).unwrap();
    let p2 = OfflineP2::new(main, cheating_recovery, config.clone()).unwrap();

    let (mut channels_p1, mut channels_p2) = channels(config.channels());
    let (mut ot_sender, mut ot_receiver) = ideal_ot();

    tokio::try_join!(
        async {
            p1.run(&mut channels_p1, &mut ot_sender)
                .await
                .map_err(ProtocolError::from)
        },
        async {
            p2.run(&mut channels_p2, &mut ot_receiver)
                .await
                .map_err(ProtocolError::from)
        }
    )
    .unwrap()
}
