//! Snapshot tests
//!
//! Resolves each *.tf file in /tests/fixtures/ on its own and compares the outcome and
//! every resolved instance.

#[test]
fn snapshots() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("PENNYWISE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    insta::glob!("fixtures/*.tf", |path| {
        let mut files = pennywise::config_files::ConfigFiles::default();
        files.load_file(path).expect("fixture must parse");
        let blocks = pennywise::block::build_blocks(&files).expect("valid block model");

        let functions = pennywise::functions::Functions::builtin();
        let resolution = pennywise::resolver::Resolver::new(&functions).resolve(&blocks);
        assert!(
            resolution.diagnostics.is_empty(),
            "{}",
            resolution.diagnostics
        );

        let instances: indexmap::IndexMap<_, _> = resolution
            .instances
            .iter()
            .map(|(address, instance)| (address, &instance.attributes))
            .collect();

        insta::assert_json_snapshot!(serde_json::json!({
            "outcome": resolution.outcome,
            "passes": resolution.passes,
            "instances": instances,
        }));
    });
}
