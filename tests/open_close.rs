//! End-to-end coverage of the OPEN/CLOSE lifecycle against the in-memory
//! server double in `support`, covering the scenarios in SPEC_FULL.md §8.

mod support;

use nfs41_open_state::close_driver::{self, CloseRequest};
use nfs41_open_state::dispatcher::{Dispatcher, Upcall};
use nfs41_open_state::mapper::{access_mask, create_opts, share_mode, Disposition};
use nfs41_open_state::open_driver::{self, OpenOutcome};
use std::sync::mpsc::sync_channel;

use support::{base_request, test_client};

#[test]
fn plain_open_of_existing_file_succeeds() {
    let (client, server) = test_client();
    server.seed_file("a.txt", 10);

    let req = base_request("/a.txt");
    let outcome = open_driver::open(&client, &server.root, req).expect("open should succeed");

    match outcome {
        OpenOutcome::Opened(info) => {
            assert!(!info.created);
            assert!(info.do_close);
            assert_eq!(info.std.size, 10);
        }
        other => panic!("expected Opened, got {other:?}"),
    }
}

#[test]
fn exclusive_create_of_missing_file_creates_it() {
    let (client, server) = test_client();

    let mut req = base_request("/fresh.txt");
    req.disposition = Disposition::Create;
    req.access_mask = access_mask::FILE_WRITE_DATA;

    let outcome = open_driver::open(&client, &server.root, req).expect("create should succeed");

    match outcome {
        OpenOutcome::Opened(info) => assert!(info.created),
        other => panic!("expected Opened, got {other:?}"),
    }
    assert!(server.file_exists("fresh.txt"));
}

#[test]
fn create_against_an_existing_file_fails_with_file_exists() {
    let (client, server) = test_client();
    server.seed_file("already.txt", 0);

    let mut req = base_request("/already.txt");
    req.disposition = Disposition::Create;

    let err = open_driver::open(&client, &server.root, req).unwrap_err();
    assert_eq!(err, nfs41_open_state::error::HostStatus::FileExists);
}

#[test]
fn supersede_over_existing_file_recreates_it() {
    let (client, server) = test_client();
    server.seed_file("b.txt", 99);

    let mut req = base_request("/b.txt");
    req.disposition = Disposition::Supersede;
    req.access_mask = access_mask::FILE_WRITE_DATA;

    let outcome = open_driver::open(&client, &server.root, req).expect("supersede should succeed");

    match outcome {
        OpenOutcome::Opened(info) => {
            assert!(!info.created, "supersede over a found file is not a create");
        }
        other => panic!("expected Opened, got {other:?}"),
    }
    assert!(server.file_exists("b.txt"));
}

#[test]
fn reparse_through_intermediate_symlink() {
    let (client, server) = test_client();
    server.seed_file("real.txt", 5);
    server.seed_symlink("link", "real.txt");

    let req = base_request("/link");
    let outcome = open_driver::open(&client, &server.root, req).expect("reparse is not an error");

    match outcome {
        OpenOutcome::Reparse { path, embedded } => {
            assert_eq!(path, "/real.txt");
            assert!(!embedded, "the symlink was the leaf component");
        }
        other => panic!("expected Reparse, got {other:?}"),
    }
}

#[test]
fn symlink_creation_is_deferred_to_second_open() {
    let (client, server) = test_client();

    let mut req = base_request("/newlink");
    req.disposition = Disposition::Create;
    req.access_mask = access_mask::FILE_WRITE_ATTRIBUTES | access_mask::SYNCHRONIZE | access_mask::DELETE;
    req.access_mode = 0;
    req.create_opts = create_opts::OPEN_REPARSE_POINT;

    let outcome = open_driver::open(&client, &server.root, req).expect("deferral is not an error");

    match outcome {
        OpenOutcome::Opened(info) => {
            assert!(!info.created, "nothing is created on the deferred first pass");
            assert!(!info.do_close, "no server OPEN was sent yet");
        }
        other => panic!("expected Opened, got {other:?}"),
    }
    assert!(!server.file_exists("newlink"), "the kernel still has to supply the symlink target");
}

#[test]
fn close_with_remove_unlinks_server_file() {
    let (client, server) = test_client();
    server.seed_file("gone.txt", 0);

    let req = base_request("/gone.txt");
    let outcome = open_driver::open(&client, &server.root, req).unwrap();
    let state_ref = match outcome {
        OpenOutcome::Opened(info) => info.state_ref,
        other => panic!("expected Opened, got {other:?}"),
    };

    close_driver::close(&client, CloseRequest { state_ref, remove: true, renamed: false, srv_open: 0 })
        .expect("close should succeed");

    assert!(!server.file_exists("gone.txt"));
    assert!(client.open_states.get(state_ref).is_none());
}

#[test]
fn dispatcher_runs_open_then_close_through_the_worker_pool() {
    let (client, server) = test_client();
    server.seed_file("queued.txt", 0);
    let dispatcher = Dispatcher::spawn(client.clone(), 2, 4);

    let (open_tx, open_rx) = sync_channel(1);
    dispatcher
        .submit(Upcall::Open {
            root: server.root.clone(),
            request: base_request("/queued.txt"),
            reply: open_tx,
        })
        .unwrap();
    let state_ref = match open_rx.recv().unwrap() {
        Ok(OpenOutcome::Opened(info)) => info.state_ref,
        other => panic!("expected a successful open, got {other:?}"),
    };

    let (close_tx, close_rx) = sync_channel(1);
    dispatcher
        .submit(Upcall::Close {
            request: CloseRequest { state_ref, remove: false, renamed: false, srv_open: 0 },
            reply: close_tx,
        })
        .unwrap();
    close_rx.recv().unwrap().expect("close should succeed");

    dispatcher.shutdown();
    assert!(client.open_states.get(state_ref).is_none());
}
