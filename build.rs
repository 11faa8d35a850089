fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Generated code is committed under src/generated/. Set
    // SNAP_ENGINE_PROTO_REGEN=1 to rebuild it from proto/ (needs protoc).
    if std::env::var_os("SNAP_ENGINE_PROTO_REGEN").is_some() {
        tonic_build::configure()
            .out_dir("src/generated")
            .type_attribute(".", "#[derive(serde::Serialize, serde::Deserialize)]")
            .compile_protos(&["proto/replication.proto"], &["."])
            .unwrap_or_else(|e| panic!("protobuf compile error: {e}"));
    }

    println!("cargo:rerun-if-env-changed=SNAP_ENGINE_PROTO_REGEN");
    println!("cargo:rerun-if-changed=proto/replication.proto");

    Ok(())
}
