fn main() -> Result<(), Box<dyn std::error::Error>> {
    // proto/supervisor.proto: SupervisorRpc (managed services <-> supervisor)
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/supervisor.proto"], &["proto/"])?;

    println!("cargo:rerun-if-changed=proto/supervisor.proto");

    Ok(())
}
