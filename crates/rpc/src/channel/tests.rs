use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::io::split;
use tokio::sync::Mutex;

use super::*;

fn echo_table() -> MethodTable {
	MethodTable::new().method("echo", |mut args| async move {
		Ok(args.pop().unwrap_or(JsonValue::Null))
	})
}

/// Wires two channels back to back and spawns both pumps.
fn connected(
	client_table: MethodTable,
	server_table: MethodTable,
) -> (RpcProxy, RpcProxy, tokio::task::JoinHandle<Result<()>>) {
	let (client_io, server_io) = tokio::io::duplex(64 * 1024);
	let (client_read, client_write) = split(client_io);
	let (server_read, server_write) = split(server_io);
	let (client, client_proxy) = RpcChannel::new(client_table);
	let (server, server_proxy) = RpcChannel::new(server_table);
	let client_task = tokio::spawn(client.run(client_read, client_write));
	tokio::spawn(server.run(server_read, server_write));
	(client_proxy, server_proxy, client_task)
}

#[tokio::test]
async fn echo_round_trip() {
	let (proxy, _server, _task) = connected(MethodTable::new(), echo_table());
	let result = proxy.call("echo", vec![json!("ping")]).await.unwrap();
	assert_eq!(result, json!("ping"));
}

#[tokio::test]
async fn null_returning_handler_still_settles_the_call() {
	// `{"result": null}` on the wire must resolve the pending call, not be
	// dropped as malformed.
	let table = MethodTable::new().method("done", |_| async move { Ok(JsonValue::Null) });
	let (proxy, _server, _task) = connected(MethodTable::new(), table);
	let result = tokio::time::timeout(Duration::from_secs(2), proxy.call("done", vec![]))
		.await
		.expect("null reply was dropped")
		.unwrap();
	assert_eq!(result, JsonValue::Null);
}

#[tokio::test]
async fn both_sides_can_call() {
	let (client_proxy, server_proxy, _task) = connected(echo_table(), echo_table());
	let from_client = client_proxy.call("echo", vec![json!(1)]).await.unwrap();
	let from_server = server_proxy.call("echo", vec![json!(2)]).await.unwrap();
	assert_eq!(from_client, json!(1));
	assert_eq!(from_server, json!(2));
}

#[tokio::test]
async fn unknown_method_yields_error_reply_not_a_crash() {
	let (proxy, _server, _task) = connected(MethodTable::new(), MethodTable::new());
	let err = proxy.call("nope", vec![]).await.unwrap_err();
	match err {
		Error::Remote(wire) => assert!(wire.message.contains("unknown method"), "{wire}"),
		other => panic!("expected remote error, got {other}"),
	}
	// The channel survives the unknown call.
	assert!(!proxy.is_closed());
}

#[tokio::test]
async fn out_of_order_replies_resolve_independently() {
	// The peer is scripted by hand so replies can be reordered.
	let (client_io, server_io) = tokio::io::duplex(64 * 1024);
	let (client_read, client_write) = split(client_io);
	let (mut server_read, mut server_write) = {
		let (r, w) = split(server_io);
		(tokio::io::BufReader::new(r), w)
	};
	let (client, proxy) = RpcChannel::new(MethodTable::new());
	tokio::spawn(client.run(client_read, client_write));

	let order: Arc<Mutex<Vec<&'static str>>> = Arc::default();
	let (oa, ob) = (order.clone(), order.clone());
	let (pa, pb) = (proxy.clone(), proxy.clone());
	let call_a = tokio::spawn(async move {
		let value = pa.call("a", vec![]).await.unwrap();
		oa.lock().await.push("a");
		value
	});
	let call_b = tokio::spawn(async move {
		let value = pb.call("b", vec![]).await.unwrap();
		ob.lock().await.push("b");
		value
	});

	let first = read_envelope(&mut server_read).await.unwrap().unwrap();
	let second = read_envelope(&mut server_read).await.unwrap().unwrap();
	let (id_a, id_b) = match (first.method.as_deref(), second.method.as_deref()) {
		(Some("a"), Some("b")) => (first.id.unwrap(), second.id.unwrap()),
		(Some("b"), Some("a")) => (second.id.unwrap(), first.id.unwrap()),
		other => panic!("unexpected request pair: {other:?}"),
	};
	assert_ne!(id_a, id_b, "correlation ids are issued monotonically");

	// Reply to B first, then A.
	write_envelope(&mut server_write, &Envelope::reply(id_b, Ok(json!("for b"))))
		.await
		.unwrap();
	write_envelope(&mut server_write, &Envelope::reply(id_a, Ok(json!("for a"))))
		.await
		.unwrap();

	assert_eq!(call_a.await.unwrap(), json!("for a"));
	assert_eq!(call_b.await.unwrap(), json!("for b"));
	assert_eq!(*order.lock().await, ["b", "a"]);
}

#[tokio::test]
async fn duplicate_reply_is_ignored() {
	let (client_io, server_io) = tokio::io::duplex(64 * 1024);
	let (client_read, client_write) = split(client_io);
	let (server_read, mut server_write) = split(server_io);
	let mut server_read = tokio::io::BufReader::new(server_read);
	let (client, proxy) = RpcChannel::new(MethodTable::new());
	tokio::spawn(client.run(client_read, client_write));

	let call = tokio::spawn({
		let proxy = proxy.clone();
		async move { proxy.call("one", vec![]).await }
	});
	let request = read_envelope(&mut server_read).await.unwrap().unwrap();
	let id = request.id.unwrap();
	write_envelope(&mut server_write, &Envelope::reply(id, Ok(json!(1)))).await.unwrap();
	write_envelope(&mut server_write, &Envelope::reply(id, Ok(json!(2)))).await.unwrap();
	assert_eq!(call.await.unwrap().unwrap(), json!(1));

	// The channel keeps working after the duplicate.
	let second = tokio::spawn({
		let proxy = proxy.clone();
		async move { proxy.call("two", vec![]).await }
	});
	let request = read_envelope(&mut server_read).await.unwrap().unwrap();
	write_envelope(&mut server_write, &Envelope::reply(request.id.unwrap(), Ok(json!(3))))
		.await
		.unwrap();
	assert_eq!(second.await.unwrap().unwrap(), json!(3));
}

#[tokio::test]
async fn closing_rejects_all_pending_calls_and_later_ones_fail_fast() {
	let (client_io, server_io) = tokio::io::duplex(64 * 1024);
	let (client_read, client_write) = split(client_io);
	let (server_read, server_write) = split(server_io);
	let mut server_read = tokio::io::BufReader::new(server_read);
	let (client, proxy) = RpcChannel::new(MethodTable::new());
	let pump = tokio::spawn(client.run(client_read, client_write));

	let calls: Vec<_> = (0..3)
		.map(|i| {
			let proxy = proxy.clone();
			tokio::spawn(async move { proxy.call(format!("m{i}"), vec![]).await })
		})
		.collect();
	for _ in 0..3 {
		read_envelope(&mut server_read).await.unwrap().unwrap();
	}

	// Drop the peer side entirely; the client sees EOF.
	drop(server_read);
	drop(server_write);

	for call in calls {
		assert!(matches!(call.await.unwrap(), Err(Error::ChannelClosed)));
	}
	pump.await.unwrap().unwrap();
	// The pump is gone; a fresh call fails immediately without blocking.
	assert!(proxy.is_closed());
	assert!(matches!(
		proxy.call("late", vec![]).await,
		Err(Error::ChannelClosed)
	));
}

#[tokio::test]
async fn call_with_timeout_rejects_when_no_reply_arrives() {
	let (client_io, server_io) = tokio::io::duplex(64 * 1024);
	let (client_read, client_write) = split(client_io);
	let (server_read, _server_write) = split(server_io);
	let mut server_read = tokio::io::BufReader::new(server_read);
	let (client, proxy) = RpcChannel::new(MethodTable::new());
	tokio::spawn(client.run(client_read, client_write));

	let outcome = tokio::join!(
		proxy.call_with_timeout("slow", vec![], Duration::from_millis(50)),
		async {
			// Swallow the request, never reply.
			read_envelope(&mut server_read).await.unwrap().unwrap();
		}
	);
	match outcome.0 {
		Err(Error::CallTimeout { method }) => assert_eq!(method, "slow"),
		other => panic!("expected timeout, got {other:?}"),
	}
}

#[tokio::test]
async fn stale_timed_out_entry_does_not_capture_a_late_reply() {
	let (client_io, server_io) = tokio::io::duplex(64 * 1024);
	let (client_read, client_write) = split(client_io);
	let (server_read, mut server_write) = split(server_io);
	let mut server_read = tokio::io::BufReader::new(server_read);
	let (client, proxy) = RpcChannel::new(MethodTable::new());
	tokio::spawn(client.run(client_read, client_write));

	let (timed_out, stale_id) = tokio::join!(
		proxy.call_with_timeout("slow", vec![], Duration::from_millis(50)),
		async {
			let request = read_envelope(&mut server_read).await.unwrap().unwrap();
			request.id.unwrap()
		}
	);
	assert!(matches!(timed_out, Err(Error::CallTimeout { .. })));

	// The next request sweeps the abandoned entry; the late reply to the
	// stale id is then ignored and the fresh call gets its own result.
	let second = tokio::spawn({
		let proxy = proxy.clone();
		async move { proxy.call("next", vec![]).await }
	});
	let request = read_envelope(&mut server_read).await.unwrap().unwrap();
	let fresh_id = request.id.unwrap();
	write_envelope(&mut server_write, &Envelope::reply(stale_id, Ok(json!("stale"))))
		.await
		.unwrap();
	write_envelope(&mut server_write, &Envelope::reply(fresh_id, Ok(json!("fresh"))))
		.await
		.unwrap();
	assert_eq!(second.await.unwrap().unwrap(), json!("fresh"));
}

#[tokio::test]
async fn notifications_dispatch_without_reply_and_unknown_ones_are_dropped() {
	let hits = Arc::new(AtomicUsize::new(0));
	let table = {
		let hits = hits.clone();
		MethodTable::new()
			.method("bump", move |_| {
				let hits = hits.clone();
				async move {
					hits.fetch_add(1, Ordering::SeqCst);
					Ok(JsonValue::Null)
				}
			})
			.method("echo", |mut args| async move { Ok(args.pop().unwrap_or(JsonValue::Null)) })
	};
	let (proxy, _server, _task) = connected(MethodTable::new(), table);

	proxy.notify("bump", vec![]).unwrap();
	proxy.notify("no_such_method", vec![]).unwrap();
	// A round-trip call flushes both notifications through the peer.
	proxy.call("echo", vec![json!(0)]).await.unwrap();
	tokio::time::timeout(Duration::from_secs(2), async {
		while hits.load(Ordering::SeqCst) == 0 {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("bump notification was never dispatched");
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}
