//! Build script for the Trove API
//!
//! Compiles proto/trove.proto into the gRPC server and client code used by
//! `crate::grpc`.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_prost_build::configure()
        .build_server(true)
        // Client code is used by the integration tests.
        .build_client(true)
        .compile_protos(&["proto/trove.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/trove.proto");

    Ok(())
}
