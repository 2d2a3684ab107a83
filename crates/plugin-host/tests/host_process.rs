//! End-to-end test against the real host binary over piped stdio.

use std::process::Stdio;
use std::time::Duration;

use serde_json::json;
use tokio::process::Command;

use atelier_rpc::{Error, MethodTable, RpcChannel};

const CALL_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::test]
async fn host_binary_speaks_the_lifecycle_protocol() {
	let mut child = Command::new(env!("CARGO_BIN_EXE_atelier-plugin-host"))
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::null())
		.kill_on_drop(true)
		.spawn()
		.expect("spawn host binary");
	let stdin = child.stdin.take().expect("piped stdin");
	let stdout = child.stdout.take().expect("piped stdout");

	let (channel, proxy) = RpcChannel::new(MethodTable::new());
	let pump = tokio::spawn(channel.run(stdout, stdin));

	proxy
		.call_with_timeout(
			"initialize",
			vec![json!(""), json!({ "name": "e2e" })],
			CALL_DEADLINE,
		)
		.await
		.expect("initialize succeeds");

	// No plugins are linked into the stock binary, so any load is rejected
	// with an error reply rather than a dead channel.
	let missing = proxy
		.call_with_timeout(
			"loadPlugin",
			vec![json!(""), json!({ "id": "ghost" })],
			CALL_DEADLINE,
		)
		.await;
	assert!(
		matches!(missing, Err(Error::Remote(ref e)) if e.message.contains("ghost")),
		"expected remote error, got {missing:?}"
	);

	proxy
		.call_with_timeout("stopPlugins", vec![json!(""), json!([])], CALL_DEADLINE)
		.await
		.expect("stopPlugins succeeds");

	// Dropping the last proxy ends the pump, which closes the child's stdin;
	// the host exits on EOF.
	drop(proxy);
	pump.await.expect("pump task").expect("clean channel shutdown");
	let status = tokio::time::timeout(CALL_DEADLINE, child.wait())
		.await
		.expect("host exits after EOF")
		.expect("wait");
	assert!(status.success(), "host exited with {status}");
}
