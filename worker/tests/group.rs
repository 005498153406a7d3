use std::{io, time::Duration};

use comms::{
    GroupListener,
    specs::{
        rollout::{EnvSpec, PolicySpec},
        worker::{Backend, CollectorKind, WorkerSpec},
    },
};
use rollout::{BuiltinFactory, CollectorOptions, CollectorSettings, LocalCollector};
use worker::WorkerErr;

fn spec(addr: String, kind: CollectorKind, num_envs: usize) -> WorkerSpec {
    WorkerSpec {
        rank: 1,
        world_size: 2,
        addr,
        backend: Backend::Tcp,
        kind,
        num_envs,
        env: EnvSpec::new("counter"),
        policy: PolicySpec::new("linear"),
        frames_per_batch: 6,
        total_frames: 12,
        update_interval: 1,
        options: serde_json::json!({ "seed": 3 }),
        connect_timeout_secs: 5,
        share_policy: true,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_joins_and_fills_its_slice() -> io::Result<()> {
    let listener = GroupListener::bind(Backend::Tcp, "127.0.0.1:0").await?;
    let spec = spec(listener.local_addr()?, CollectorKind::Sync, 2);

    let worker_task = {
        let spec = spec.clone();
        tokio::spawn(async move { worker::run(&spec, &BuiltinFactory).await })
    };

    let mut group = listener.accept_all(2, Duration::from_secs(5)).await?;

    // The coordinator sizes its buffer from a local probe of the same collector.
    let mut probe = LocalCollector::build(
        &BuiltinFactory,
        &CollectorSettings {
            kind: spec.kind,
            num_envs: spec.num_envs,
            env: spec.env.clone(),
            policy: spec.policy.clone(),
            frames_per_batch: 6,
            total_frames: 6,
            options: CollectorOptions::default(),
            share_policy: false,
            await_params: false,
        },
    )
    .unwrap();
    let mut buffer = probe.next_batch().unwrap().unwrap().stacked(1);
    probe.shutdown();
    buffer.lock();

    for round in 0..2 {
        let params = [round as f32 + 0.5, 0.];
        comms::wait_all(group.isend_params(&params))
            .await
            .map_err(|(_, e)| e)?;
        comms::wait_all(group.irecv_fields(buffer.worker_slices_mut()))
            .await
            .map_err(|(_, e)| e)?;

        let reward = buffer.get("reward").unwrap().data();
        assert!(reward.iter().all(|&r| r == round as f32 + 0.5));

        let obs = buffer.get("observation").unwrap().data();
        assert_eq!(&obs[..3], [3. * round as f32, 3. * round as f32 + 1., 3. * round as f32 + 2.]);
    }

    let report = worker_task.await.unwrap().unwrap();
    assert_eq!(report.frames, 12);
    Ok(())
}

#[tokio::test]
async fn join_gives_up_after_the_connect_timeout() {
    let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = free.local_addr().unwrap().to_string();
    drop(free);

    let mut spec = spec(addr.clone(), CollectorKind::Single, 1);
    spec.connect_timeout_secs = 1;

    let err = worker::run(&spec, &BuiltinFactory).await.unwrap_err();
    let e = match err {
        WorkerErr::Io(e) => e,
        other => panic!("expected an io error, got {other}"),
    };

    assert_eq!(e.kind(), io::ErrorKind::TimedOut);
    assert!(e.to_string().contains(&addr));
}
