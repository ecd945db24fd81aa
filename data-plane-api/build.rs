use glob::glob;
use std::io;
use std::path::PathBuf;

fn main() -> io::Result<()> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().unwrap());
    }
    let protos: Vec<PathBuf> = glob("proto/envoy/**/*.proto")
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    let mut config = prost_build::Config::new();
    config.disable_comments(["."]);
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_well_known_types(true)
        .include_file("mod.rs")
        .compile_with_config(config, &protos, &["proto"])?;
    Ok(())
}
