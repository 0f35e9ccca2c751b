use frame_batch::config::Config;

#[test]
fn parse_example_config() {
    let raw = include_str!("../frame-batch.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.scan.extension, "mp4");
    assert!(cfg.scan.recursive);
    assert_eq!(cfg.analysis.frame_skip, 30);
    assert_eq!(cfg.analyzer.capture_limit_bytes, 10 * 1024 * 1024);
    assert!(cfg.analyzer.args.iter().any(|a| a == "{output}"));
}

#[test]
fn partial_sections_fall_back_to_defaults() {
    let raw = r#"
        [scan]
        extension = ".MOV"

        [analyzer]
        program = "sh"
    "#;
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    let opts = cfg.run_options();
    assert_eq!(opts.extension, "MOV");
    assert!(opts.recursive);
    assert_eq!(opts.output_suffix, "_analysis.txt");
    assert_eq!(cfg.analyzer.program, "sh");
    assert_eq!(cfg.analyzer.args.len(), 7);
    assert_eq!(cfg.logging.level, "info");
}

#[test]
fn empty_file_is_all_defaults() {
    let cfg: Config = toml::from_str("").expect("parse TOML");
    let opts = cfg.run_options();
    assert_eq!(opts.delay, 0.0);
    assert_eq!(opts.frame_skip, 30);
    assert!(!opts.force);
}
