//! Directory loading and resolution end to end

use pennywise::config_files::{ConfigFiles, LoadError};
use pennywise::functions::Functions;
use pennywise::resolver::{Outcome, ResolveOptions};
use pennywise::value::Value;
use pretty_assertions::assert_eq;
use std::path::Path;

fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

fn resolve(dir: &Path) -> pennywise::resolver::Resolution {
    pennywise::resolve_directory(dir, &Functions::builtin(), ResolveOptions::default())
        .expect("project resolves")
}

#[test]
fn loads_nested_directories_and_skips_hidden_ones() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.tf", r#"resource "x" "main" {}"#);
    write(dir.path(), "nested/more.tf", r#"resource "x" "nested" {}"#);
    write(dir.path(), ".terraform/modules/ignored.tf", r#"resource "x" "hidden" {}"#);
    write(dir.path(), "README.md", "not configuration");

    let mut files = ConfigFiles::default();
    files.load_directory(dir.path()).unwrap();
    assert_eq!(files.source_count(), 2);

    let resolution = resolve(dir.path());
    let addresses: Vec<_> = resolution.instances.keys().cloned().collect();
    assert_eq!(addresses, vec!["x.main", "x.nested"]);
}

#[test]
fn references_resolve_regardless_of_file_order() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.tf", r#"resource "x" "consumer" { region = var.region }"#);
    write(dir.path(), "b.tf", r#"variable "region" { default = "eu-west-1" }"#);

    let resolution = resolve(dir.path());
    assert_eq!(resolution.outcome, Outcome::Converged);
    assert_eq!(
        resolution.get("x.consumer").unwrap().attributes["region"],
        Value::from("eu-west-1")
    );
}

#[test]
fn native_and_json_files_mix() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "variables.tf.json",
        r#"{ "variable": { "size": { "default": "t3.micro" } } }"#,
    );
    write(
        dir.path(),
        "main.tf",
        r#"resource "aws_instance" "web" { instance_type = var.size }"#,
    );

    let resolution = resolve(dir.path());
    assert_eq!(
        resolution.get("aws_instance.web").unwrap().attributes["instance_type"],
        Value::from("t3.micro")
    );
}

#[test]
fn empty_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "notes.txt", "nothing to see");

    let err = pennywise::resolve_directory(dir.path(), &Functions::builtin(), Default::default())
        .unwrap_err();
    assert!(matches!(
        err,
        pennywise::Error::Load(LoadError::NoFilesFound(_))
    ));
}

#[test]
fn parse_errors_name_the_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "broken.tf", "resource \"x\" {");

    let err = pennywise::resolve_directory(dir.path(), &Functions::builtin(), Default::default())
        .unwrap_err();
    let pennywise::Error::Load(LoadError::HclParseFailed { path, .. }) = &err else {
        panic!("expected a parse error, got {err:?}");
    };
    assert_eq!(path.file_name().unwrap(), "broken.tf");
}

#[test]
fn schema_errors_stop_resolution() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.tf", r#"resource "only_type" {}"#);

    let err = pennywise::resolve_directory(dir.path(), &Functions::builtin(), Default::default())
        .unwrap_err();
    assert!(matches!(err, pennywise::Error::Schema(_)));
    assert!(err.to_string().contains("resource block expects 2 label(s), found 1"));
}

#[test]
fn resolving_twice_gives_the_same_result() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "main.tf",
        r#"
        locals { zones = ["a", "b"] }
        resource "subnet" "zone" {
          for_each = toset(local.zones)
          cidr     = "10.0.${length(each.value)}.0/24"
        }
        "#,
    );

    let first = resolve(dir.path());
    let second = resolve(dir.path());
    assert_eq!(first.instances, second.instances);
    assert_eq!(first.passes, second.passes);
}
