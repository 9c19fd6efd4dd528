fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/image_generation.proto");

    // Hermetic build: avoid a system `protoc` dependency.
    let protoc = protoc_bin_vendored::protoc_bin_path()?;
    std::env::set_var("PROTOC", protoc);

    // The server half is only used by tests, which stand up an in-process fake.
    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&["proto/image_generation.proto"], &["proto"])?;
    Ok(())
}
