mod common;

use std::path::Path;

use plate_core::AnyEmptyResult;

fn write_file(root: &Path, relative: &str, content: &str) -> AnyEmptyResult {
	let path = root.join(relative);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent)?;
	}
	std::fs::write(path, content)?;

	Ok(())
}

#[test]
fn renders_into_output_directory() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), "values.yaml", "name: web\nports: [80, 443]\n")?;
	write_file(tmp.path(), "templates/app.yaml", "name: ${ name }\nports: ${ ports }\n")?;
	write_file(tmp.path(), "templates/nested/svc.json", "{\"first\": \"${ ports[0] }\"}")?;

	common::plate_cmd()
		.arg("-p")
		.arg("templates/**/*")
		.arg("-c")
		.arg("values.yaml")
		.arg("-d")
		.arg("out")
		.arg("-b")
		.arg("templates")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("Rendered 2 document(s)"));

	let app = std::fs::read_to_string(tmp.path().join("out/app.yaml"))?;
	let app: serde_yaml_ng::Value = serde_yaml_ng::from_str(&app)?;
	let expected: serde_yaml_ng::Value = serde_yaml_ng::from_str("name: web\nports: [80, 443]\n")?;
	assert_eq!(app, expected);

	let svc = std::fs::read_to_string(tmp.path().join("out/nested/svc.json"))?;
	let svc: serde_json::Value = serde_json::from_str(&svc)?;
	assert_eq!(svc, serde_json::json!({ "first": 80 }));

	Ok(())
}

#[test]
fn combines_documents_into_single_file() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), "values.json", "{\"b\": \"bee\"}")?;
	write_file(tmp.path(), "templates/b.yaml", "b: ${ b }")?;
	write_file(tmp.path(), "templates/a.yaml", "a: 1")?;

	common::plate_cmd()
		.arg("--pattern")
		.arg("templates/*.yaml")
		.arg("--context")
		.arg("values.json")
		.arg("--single-file")
		.arg("dist/all.yaml")
		.arg("--sorted")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success();

	let combined = std::fs::read_to_string(tmp.path().join("dist/all.yaml"))?;
	assert_eq!(combined, "a: 1\n---\nb: bee\n");

	Ok(())
}

#[test]
fn writes_to_stdout_by_default() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), "plate.context.yaml", "port: 8080\n")?;
	write_file(tmp.path(), "service.json", "{\"port\": \"${ port }\", \"drop\": \"${ nope }\"}")?;

	common::plate_cmd()
		.arg("-p")
		.arg("*.json")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout("{\n  \"port\": 8080\n}");

	Ok(())
}

#[test]
fn reads_context_from_config_file() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), ".plate.toml", "context = { path = \"data/ctx\", format = \"toml\" }\n")?;
	write_file(tmp.path(), "data/ctx", "greeting = \"hello\"\n")?;
	write_file(tmp.path(), "doc.yaml", "message: ${ greeting ~ ' world' }\n")?;

	common::plate_cmd()
		.arg("-p")
		.arg("doc.yaml")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout("message: hello world\n");

	Ok(())
}

#[cfg(unix)]
#[test]
fn reads_context_from_command() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), "doc.yaml", "items:\n- zero\n- ${ ...items }\n")?;

	common::plate_cmd()
		.arg("-p")
		.arg("doc.yaml")
		.arg("--context-command")
		.arg(r#"printf '{"items": ["one", "two"]}'"#)
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("- zero"))
		.stdout(predicates::str::contains("- one"))
		.stdout(predicates::str::contains("- two"));

	Ok(())
}

#[test]
fn evaluation_errors_exit_with_failure() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), "doc.yaml", "a: ${ 1 + }\n")?;

	common::plate_cmd()
		.arg("-p")
		.arg("doc.yaml")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.code(1)
		.stderr(predicates::str::contains("plate::evaluation"));

	Ok(())
}

#[test]
fn unknown_extensions_fail_without_fallback() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), "templates/doc.tpl", "a: ${ 1 }\n")?;

	common::plate_cmd()
		.arg("-p")
		.arg("templates/*")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.code(1)
		.stderr(predicates::str::contains("plate::unknown_extension"));

	common::plate_cmd()
		.arg("-p")
		.arg("templates/*")
		.arg("--unknown-extension")
		.arg("yaml")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout("a: 1\n");

	Ok(())
}

#[test]
fn json_cannot_be_combined() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), "doc.json", "{}")?;

	common::plate_cmd()
		.arg("-p")
		.arg("*.json")
		.arg("-s")
		.arg("all.yaml")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.code(1)
		.stderr(predicates::str::contains("plate::not_combinable"));

	Ok(())
}

#[test]
fn base_dir_rejects_files_outside_it() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	write_file(tmp.path(), "other/doc.yaml", "a: 1\n")?;
	write_file(tmp.path(), "templates/keep.yaml", "b: 1\n")?;

	common::plate_cmd()
		.arg("-p")
		.arg("other/*.yaml")
		.arg("-d")
		.arg("out")
		.arg("-b")
		.arg("templates")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.code(1)
		.stderr(predicates::str::contains("plate::path_safety"));

	Ok(())
}

#[test]
fn output_modes_are_mutually_exclusive() {
	common::plate_cmd()
		.args(["-p", "*.yaml", "-d", "out", "-s", "all.yaml"])
		.assert()
		.failure()
		.code(2);
}

#[test]
fn base_dir_requires_output_directory() {
	common::plate_cmd()
		.args(["-p", "*.yaml", "-b", "templates"])
		.assert()
		.failure()
		.code(2);
}

#[test]
fn context_sources_are_mutually_exclusive() {
	common::plate_cmd()
		.args(["-p", "*.yaml", "-c", "ctx.json", "--context-command", "echo {}"])
		.assert()
		.failure()
		.code(2);
}
