//! Integration test: drives a real `Client::fetch` conversation against a
//! fake `git` subcommand dispatcher spawned as a local subprocess, exercising
//! the transport, framer, and negotiation layers together instead of each in
//! isolation.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;

use git_transport::client::Client;
use git_transport::config::ClientOptions;
use git_transport::fetch::EmptyGraphWalker;

/// Writes a fake `git` binary that only understands `git upload-pack <path>`,
/// mirroring what `LocalTransport::connect` actually spawns (spec.md §4.G:
/// "spawn `git <service> <path>`").
fn write_fake_git(dir: &std::path::Path) -> std::path::PathBuf {
    let script_path = dir.join("git");
    let body = r#"#!/bin/sh
if [ "$1" != "upload-pack" ]; then
    echo "unexpected git subcommand: $1" >&2
    exit 1
fi
printf '0032%s HEAD\n' 0000000000000000000000000000000000000001
printf '0000'
printf '0008NAK\n'
printf 'PACK-FAKE-BYTES'
"#;
    let mut f = fs::File::create(&script_path).unwrap();
    f.write_all(body.as_bytes()).unwrap();
    let mut perms = fs::metadata(&script_path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script_path, perms).unwrap();
    script_path
}

#[test]
fn fetch_drains_pack_from_local_subprocess() {
    let _ = tracing_subscriber::fmt::try_init();

    let dir = tempfile::tempdir().unwrap();
    write_fake_git(dir.path());

    let path_var = format!(
        "{}:{}",
        dir.path().display(),
        std::env::var("PATH").unwrap_or_default()
    );
    // SAFETY: test runs single-threaded by default for integration tests in
    // this crate and no other thread reads/writes PATH concurrently.
    unsafe {
        std::env::set_var("PATH", path_var);
    }

    let client = Client::new(ClientOptions::default());
    let mut pack = Vec::new();
    let repo_path = dir.path().join("repo.git");
    let advertisement = client
        .fetch(
            repo_path.to_str().unwrap(),
            |refs| refs.iter().map(|r| r.id.clone()).collect(),
            &mut EmptyGraphWalker,
            |data| pack.extend_from_slice(data),
            None,
        )
        .unwrap();

    assert_eq!(advertisement.refs.len(), 1);
    assert_eq!(advertisement.refs[0].name, "HEAD");
    assert_eq!(pack, b"PACK-FAKE-BYTES");
}
