use std::io;

use comms::{
    OnoReceiver,
    msg::{Command, Msg, Payload},
    specs::{
        rollout::{EnvSpec, PolicySpec},
        worker::{Backend, CollectorKind, WorkerSpec},
    },
};
use rollout::BuiltinFactory;
use tokio::io as tokio_io;
use worker::{WorkerBuilder, WorkerErr, WorkerReport};

const FIELDS: usize = 6;
const REWARD: usize = 4;

fn spec(policy: &str, frames_per_batch: usize, total_frames: usize, interval: usize) -> WorkerSpec {
    WorkerSpec {
        rank: 1,
        world_size: 2,
        addr: String::new(),
        backend: Backend::Tcp,
        kind: CollectorKind::Single,
        num_envs: 1,
        env: EnvSpec::new("counter"),
        policy: PolicySpec::new(policy),
        frames_per_batch,
        total_frames,
        update_interval: interval,
        options: serde_json::Value::Null,
        connect_timeout_secs: 1,
        share_policy: false,
    }
}

/// Receives one batch of the counter env, fields in name order.
async fn recv_batch<R: tokio::io::AsyncRead + Unpin>(
    rx: &mut OnoReceiver<R>,
    frames: usize,
) -> io::Result<Vec<Vec<f32>>> {
    let mut fields = Vec::with_capacity(FIELDS);
    for _ in 0..FIELDS {
        let mut field = vec![0.; frames];
        rx.recv_field_into(&mut field).await?;
        fields.push(field);
    }

    Ok(fields)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn weights_are_loaded_before_each_due_batch() -> io::Result<()> {
    let (sv_stream, wk_stream) = tokio_io::duplex(4096);

    let (sv_rx, sv_tx) = tokio_io::split(sv_stream);
    let (mut sv_rx, mut sv_tx) = comms::channel(sv_rx, sv_tx);

    let (wk_rx, wk_tx) = tokio_io::split(wk_stream);
    let (wk_rx, wk_tx) = comms::channel(wk_rx, wk_tx);

    let worker = WorkerBuilder::build(&spec("linear", 4, 12, 1), &BuiltinFactory).unwrap();
    let worker_task = tokio::spawn(async move { worker.run(wk_rx, wk_tx).await });

    for round in 0..3 {
        // bias first, then the weight
        let params = [round as f32, 0.];
        sv_tx.send(&Msg::Data(Payload::Params(&params))).await?;

        let fields = recv_batch(&mut sv_rx, 4).await?;
        assert_eq!(fields[REWARD], [round as f32; 4]);
    }

    let report = worker_task.await.unwrap().unwrap();
    assert_eq!(
        report,
        WorkerReport {
            frames: 12,
            batches: 3,
            weight_updates: 3,
        }
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interval_spaces_out_the_updates() -> io::Result<()> {
    let (sv_stream, wk_stream) = tokio_io::duplex(4096);

    let (sv_rx, sv_tx) = tokio_io::split(sv_stream);
    let (mut sv_rx, mut sv_tx) = comms::channel(sv_rx, sv_tx);

    let (wk_rx, wk_tx) = tokio_io::split(wk_stream);
    let (wk_rx, wk_tx) = comms::channel(wk_rx, wk_tx);

    let worker = WorkerBuilder::build(&spec("linear", 2, 8, 2), &BuiltinFactory).unwrap();
    let worker_task = tokio::spawn(async move { worker.run(wk_rx, wk_tx).await });

    for round in 0..4 {
        if round % 2 == 0 {
            let params = [round as f32, 0.];
            sv_tx.send(&Msg::Data(Payload::Params(&params))).await?;
        }

        let fields = recv_batch(&mut sv_rx, 2).await?;
        let bias = (round - round % 2) as f32;
        assert_eq!(fields[REWARD], [bias; 2]);
    }

    let report = worker_task.await.unwrap().unwrap();
    assert_eq!(report.weight_updates, 2);
    assert_eq!(report.batches, 4);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_ends_the_run_gracefully() -> io::Result<()> {
    let (sv_stream, wk_stream) = tokio_io::duplex(4096);

    let (sv_rx, sv_tx) = tokio_io::split(sv_stream);
    let (mut sv_rx, mut sv_tx) = comms::channel(sv_rx, sv_tx);

    let (wk_rx, wk_tx) = tokio_io::split(wk_stream);
    let (wk_rx, wk_tx) = comms::channel(wk_rx, wk_tx);

    let worker = WorkerBuilder::build(&spec("linear", 4, 40, 1), &BuiltinFactory).unwrap();
    let worker_task = tokio::spawn(async move { worker.run(wk_rx, wk_tx).await });

    let params = [1.0_f32, 1.0];
    sv_tx.send(&Msg::Data(Payload::Params(&params))).await?;
    recv_batch(&mut sv_rx, 4).await?;
    sv_tx.send(&Msg::Control(Command::Stop)).await?;

    let report = worker_task.await.unwrap().unwrap();
    assert_eq!(report.batches, 1);
    assert_eq!(report.weight_updates, 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_reports_wrong_weight_length() -> io::Result<()> {
    let (sv_stream, wk_stream) = tokio_io::duplex(4096);

    let (sv_rx, sv_tx) = tokio_io::split(sv_stream);
    let (mut sv_rx, mut sv_tx) = comms::channel(sv_rx, sv_tx);

    let (wk_rx, wk_tx) = tokio_io::split(wk_stream);
    let (wk_rx, wk_tx) = comms::channel(wk_rx, wk_tx);

    let worker = WorkerBuilder::build(&spec("linear", 4, 8, 1), &BuiltinFactory).unwrap();
    let worker_task = tokio::spawn(async move { worker.run(wk_rx, wk_tx).await });

    let w = [1.0_f32, 2.0, 3.0];
    sv_tx.send(&Msg::Data(Payload::Params(&w))).await?;

    let res = worker_task.await.unwrap();
    assert!(matches!(res, Err(WorkerErr::Rollout(_))));

    let err = recv_batch(&mut sv_rx, 4).await.unwrap_err();
    assert!(err.to_string().contains("peer reported: worker 1"));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_rejects_unexpected_message() -> io::Result<()> {
    let (sv_stream, wk_stream) = tokio_io::duplex(4096);

    let (sv_rx, sv_tx) = tokio_io::split(sv_stream);
    let (_sv_rx, mut sv_tx) = comms::channel(sv_rx, sv_tx);

    let (wk_rx, wk_tx) = tokio_io::split(wk_stream);
    let (wk_rx, wk_tx) = comms::channel(wk_rx, wk_tx);

    let worker = WorkerBuilder::build(&spec("linear", 4, 8, 1), &BuiltinFactory).unwrap();
    let worker_task = tokio::spawn(async move { worker.run(wk_rx, wk_tx).await });

    let field = [0.0_f32; 4];
    sv_tx.send(&Msg::Data(Payload::Field(&field))).await?;

    let res = worker_task.await.unwrap();
    assert!(matches!(
        res,
        Err(WorkerErr::UnexpectedMessage {
            batch: 0,
            got: "data/field"
        })
    ));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parameterless_policy_streams_without_waiting() -> io::Result<()> {
    let (sv_stream, wk_stream) = tokio_io::duplex(4096);

    let (sv_rx, sv_tx) = tokio_io::split(sv_stream);
    let (mut sv_rx, _sv_tx) = comms::channel(sv_rx, sv_tx);

    let (wk_rx, wk_tx) = tokio_io::split(wk_stream);
    let (wk_rx, wk_tx) = comms::channel(wk_rx, wk_tx);

    let worker = WorkerBuilder::build(&spec("random", 4, 12, 1), &BuiltinFactory).unwrap();
    let worker_task = tokio::spawn(async move { worker.run(wk_rx, wk_tx).await });

    for _ in 0..3 {
        let fields = recv_batch(&mut sv_rx, 4).await?;
        assert!(fields[REWARD].iter().all(|r| (-1.0..=1.0).contains(r)));
    }

    let report = worker_task.await.unwrap().unwrap();
    assert_eq!(report.frames, 12);
    assert_eq!(report.weight_updates, 0);

    Ok(())
}

#[test]
fn single_collector_with_many_envs_is_rejected() {
    let mut spec = spec("linear", 4, 8, 1);
    spec.num_envs = 2;

    let Err(err) = WorkerBuilder::build(&spec, &BuiltinFactory) else {
        panic!("a single collector drives one environment");
    };
    assert!(matches!(err, WorkerErr::InvalidConfig(_)));
}

#[test]
fn zero_update_interval_is_rejected() {
    let Err(err) = WorkerBuilder::build(&spec("linear", 4, 8, 0), &BuiltinFactory) else {
        panic!("the update interval must be positive");
    };
    assert!(matches!(err, WorkerErr::InvalidConfig(_)));
}
