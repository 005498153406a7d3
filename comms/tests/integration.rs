use std::{borrow::Cow, io::ErrorKind, time::Duration};

use comms::{
    GroupListener, Serialize,
    msg::{Command, Msg, Payload},
    specs::worker::Backend,
};
use tokio::io;

#[test]
fn serialize_keeps_field_values_out_of_the_header() {
    let field = [0.5_f32; 4];
    let msg = Msg::Data(Payload::Field(&field));
    let mut head = Vec::new();
    let tail = msg.serialize(&mut head).unwrap();

    assert_eq!(head.len(), 4);
    assert_eq!(tail.len(), 16);
}

#[tokio::test]
async fn send_recv() {
    const SIZE: usize = 128;

    let params = [1.0_f32, 2.0, 3.0];
    let msg = Msg::Data(Payload::Params(&params));

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    tx.send(&msg).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u32> = Vec::new();
    let Msg::Data(Payload::Params(got)) = rx.recv_into(&mut buf).await.unwrap() else {
        panic!("expected parameters");
    };

    assert_eq!(got, params);
}

#[tokio::test]
async fn field_lands_in_the_destination_slice() {
    let field = [4.0_f32, 5.0, 6.0, 7.0];

    let (one, two) = io::duplex(256);
    let (_, mut tx) = comms::channel(io::empty(), one);
    let (mut rx, _) = comms::channel(two, io::sink());

    tx.send(&Msg::Data(Payload::Field(&field))).await.unwrap();

    let mut dst = [0.0_f32; 4];
    rx.recv_field_into(&mut dst).await.unwrap();
    assert_eq!(dst, field);
}

#[tokio::test]
async fn mismatched_field_is_rejected() {
    let field = [1.0_f32; 3];

    let (one, two) = io::duplex(256);
    let (_, mut tx) = comms::channel(io::empty(), one);
    let (mut rx, _) = comms::channel(two, io::sink());

    tx.send(&Msg::Data(Payload::Field(&field))).await.unwrap();
    tx.send(&Msg::Control(Command::Stop)).await.unwrap();

    let mut dst = [0.0_f32; 4];
    let err = rx.recv_field_into(&mut dst).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    assert!(err.to_string().contains("mismatch"));

    let err = rx.recv_field_into(&mut dst).await.unwrap_err();
    assert!(err.to_string().contains("control"));
}

#[tokio::test]
async fn peer_error_text_reaches_the_receiver() {
    let (one, two) = io::duplex(256);
    let (_, mut tx) = comms::channel(io::empty(), one);
    let (mut rx, _) = comms::channel(two, io::sink());

    tx.send(&Msg::Err(Cow::Borrowed("env exploded"))).await.unwrap();

    let mut dst = [0.0_f32; 2];
    let err = rx.recv_field_into(&mut dst).await.unwrap_err();
    assert!(err.to_string().contains("env exploded"));
}

#[tokio::test]
async fn group_gathers_fields_in_rank_order() {
    let listener = GroupListener::bind(Backend::Tcp, "127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut workers = Vec::new();
    for rank in [2, 1] {
        let addr = addr.clone();
        workers.push(tokio::spawn(async move {
            let (peer, world_size) =
                comms::group::join(Backend::Tcp, &addr, rank, Duration::from_secs(5))
                    .await
                    .unwrap();
            assert_eq!(world_size, 3);

            let (mut rx, mut tx) = peer.into_parts();
            let mut buf: Vec<u32> = Vec::new();
            let Msg::Data(Payload::Params(params)) = rx.recv_into(&mut buf).await.unwrap() else {
                panic!("expected parameters");
            };

            let field: Vec<f32> = params.iter().map(|p| p * rank as f32).collect();
            tx.send(&Msg::Data(Payload::Field(&field))).await.unwrap();
        }));
    }

    let mut group = listener
        .accept_all(3, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(group.world_size(), 3);

    let params = [1.0_f32, 2.0];
    comms::wait_all(group.isend_params(&params)).await.unwrap();

    let mut out = [0.0_f32; 4];
    let (first, second) = out.split_at_mut(2);
    comms::wait_all(group.irecv_fields(vec![vec![first], vec![second]]))
        .await
        .unwrap();

    assert_eq!(out, [1.0, 2.0, 2.0, 4.0]);

    for worker in workers {
        worker.await.unwrap();
    }
}

#[tokio::test]
async fn rendezvous_times_out_with_the_address() {
    let listener = GroupListener::bind(Backend::Tcp, "127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let err = match listener.accept_all(2, Duration::from_millis(50)).await {
        Ok(_) => panic!("nobody joined"),
        Err(e) => e,
    };

    assert_eq!(err.kind(), ErrorKind::TimedOut);
    assert!(err.to_string().contains(&addr));
}

#[tokio::test]
async fn join_times_out_when_nobody_listens() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = match comms::group::join(Backend::Tcp, &addr, 1, Duration::from_millis(200)).await {
        Ok(_) => panic!("there is no coordinator"),
        Err(e) => e,
    };

    assert_eq!(err.kind(), ErrorKind::TimedOut);
    assert!(err.to_string().contains(&addr));
}

#[cfg(unix)]
#[tokio::test]
async fn unix_socket_file_is_removed_with_the_group() {
    let path = std::env::temp_dir().join(format!("comms-{}.sock", std::process::id()));
    let addr = path.display().to_string();

    let listener = GroupListener::bind(Backend::Unix, &addr).await.unwrap();
    assert!(path.exists());

    let worker = {
        let addr = addr.clone();
        tokio::spawn(async move {
            comms::group::join(Backend::Unix, &addr, 1, Duration::from_secs(5))
                .await
                .unwrap()
        })
    };

    let mut group = listener.accept_all(2, Duration::from_secs(5)).await.unwrap();
    let (peer, _) = worker.await.unwrap();

    group.stop().await;
    let (mut rx, _) = peer.into_parts();
    let mut buf: Vec<u32> = Vec::new();
    assert!(matches!(
        rx.recv_into(&mut buf).await.unwrap(),
        Msg::Control(Command::Stop)
    ));

    drop(group);
    assert!(!path.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn unix_bind_refuses_to_replace_a_regular_file() {
    let path = std::env::temp_dir().join(format!("comms-{}.not-a-sock", std::process::id()));
    std::fs::write(&path, b"keep me").unwrap();

    let err = GroupListener::bind(Backend::Unix, &path.display().to_string())
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(std::fs::read(&path).unwrap(), b"keep me");

    std::fs::remove_file(&path).unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn unix_bind_replaces_a_stale_socket() {
    let path = std::env::temp_dir().join(format!("comms-stale-{}.sock", std::process::id()));
    let addr = path.display().to_string();

    // A listener whose file outlives it, as after a crash.
    let stale = std::os::unix::net::UnixListener::bind(&path).unwrap();
    drop(stale);
    assert!(path.exists());

    let listener = GroupListener::bind(Backend::Unix, &addr).await.unwrap();
    assert_eq!(listener.local_addr().unwrap(), addr);
    drop(listener);
    assert!(!path.exists());
}
