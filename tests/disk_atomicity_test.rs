//! Concurrency test: readers polling the credential files while the helper
//! rewrites them must only ever see a complete file.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use svid_helper::{CredentialArtifact, SvidDisk, X509Bundle, X509Svid};

fn artifact_for(id: &str) -> CredentialArtifact {
    let (cert, key) = common::generate_svid(id);
    let svid = X509Svid::parse_from_der(id, &cert, &key).unwrap();
    let bundle =
        X509Bundle::parse_from_der(svid.spiffe_id().trust_domain().clone(), &cert).unwrap();
    CredentialArtifact::resolve(&svid, Some(&bundle)).unwrap()
}

#[test]
fn readers_never_observe_a_partial_svid_file() {
    let dir = tempfile::tempdir().unwrap();
    let disk = SvidDisk::new(dir.path().to_path_buf());

    // Two distinct rotations of the same identity.
    let first = artifact_for("spiffe://example.org/workload");
    let second = artifact_for("spiffe://example.org/workload");
    assert_ne!(first.svid_pem(), second.svid_pem());

    disk.write(&first).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let started = Arc::new(AtomicBool::new(false));
    let reader = {
        let stop = Arc::clone(&stop);
        let started = Arc::clone(&started);
        let path = dir.path().join("svid.pem");
        let expected = [first.svid_pem().to_vec(), second.svid_pem().to_vec()];
        std::thread::spawn(move || {
            let mut reads = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let content = std::fs::read(&path).expect("svid.pem must always be present");
                assert!(
                    expected.contains(&content),
                    "observed a torn svid.pem after {reads} reads"
                );
                reads += 1;
                started.store(true, Ordering::Relaxed);
            }
        })
    };

    while !started.load(Ordering::Relaxed) {
        std::thread::yield_now();
    }
    for i in 0..200 {
        let artifact = if i % 2 == 0 { &second } else { &first };
        disk.write(artifact).unwrap();
    }

    stop.store(true, Ordering::Relaxed);
    reader.join().unwrap();

    assert_eq!(
        std::fs::read(dir.path().join("svid.pem")).unwrap(),
        first.svid_pem()
    );
}
