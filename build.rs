fn main() -> Result<(), anyhow::Error> {
    // protox compiles the vendored proto to a descriptor set in-process,
    // so builds do not depend on a system protoc.
    let fds = protox::compile(["proto/workload.proto"], ["proto"])?;

    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_fds(fds)?;

    println!("cargo:rerun-if-changed=proto/workload.proto");
    Ok(())
}
