use assert_cmd::Command;

pub fn plate_cmd() -> Command {
	let mut cmd = Command::cargo_bin("plate").unwrap_or_else(|e| panic!("plate binary: {e}"));
	cmd.env("NO_COLOR", "1");
	cmd.env_remove("PLATE_LOG");
	cmd
}
