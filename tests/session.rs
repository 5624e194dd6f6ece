use std::sync::mpsc;

use pretty_assertions::assert_eq;
use zero_mysql_proxy::constant::{
    CAPABILITIES_PROTOCOL_41, CapabilityFlags, ColumnFlags, ColumnType,
};
use zero_mysql_proxy::error::DefinitionKind;
use zero_mysql_proxy::protocol::command::ColumnDefinition;
use zero_mysql_proxy::protocol::command::column_definition::write_column_definition;
use zero_mysql_proxy::protocol::packet::write_packets;
use zero_mysql_proxy::{
    BackendSession, BindValue, Error, ExecuteOutcome, Future, PreparedStatement, Transport, Value,
};

const EOF: &[u8] = &[0xFE, 0x00, 0x00, 0x02, 0x00];
const OK: &[u8] = &[0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Session that expects EOF packets after each definition block
fn eof_session() -> BackendSession<Vec<u8>> {
    init_tracing();
    BackendSession::new(
        Vec::new(),
        CapabilityFlags::CLIENT_PROTOCOL_41 | CapabilityFlags::CLIENT_PLUGIN_AUTH,
    )
}

fn deprecate_eof_session() -> BackendSession<Vec<u8>> {
    init_tracing();
    BackendSession::new(Vec::new(), CAPABILITIES_PROTOCOL_41)
}

/// Transport that can be unplugged mid-session
#[derive(Default)]
struct Flaky {
    sent: Vec<u8>,
    down: bool,
}

impl Transport for Flaky {
    fn send(&mut self, bytes: &[u8]) -> zero_mysql_proxy::Result<()> {
        if self.down {
            return Err(Error::Failed("socket closed".to_string()));
        }
        self.sent.extend_from_slice(bytes);
        Ok(())
    }
}

fn frame(out: &mut Vec<u8>, sequence_id: u8, payload: &[u8]) {
    write_packets(out, sequence_id, payload);
}

fn framed(packets: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, payload) in packets.iter().enumerate() {
        frame(&mut out, (i + 1) as u8, payload);
    }
    out
}

fn prepare_ok(statement_id: u32, columns: u16, params: u16) -> Vec<u8> {
    let mut payload = vec![0x00];
    payload.extend_from_slice(&statement_id.to_le_bytes());
    payload.extend_from_slice(&columns.to_le_bytes());
    payload.extend_from_slice(&params.to_le_bytes());
    payload.push(0x00);
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload
}

fn definition(name: &str, column_type: ColumnType) -> Vec<u8> {
    let mut out = Vec::new();
    write_column_definition(
        &mut out,
        &ColumnDefinition {
            catalog: "def".to_string(),
            schema: "app".to_string(),
            table: "users".to_string(),
            org_table: "users".to_string(),
            name: name.to_string(),
            org_name: name.to_string(),
            charset: 45,
            column_length: 20,
            column_type,
            flags: ColumnFlags::empty(),
            decimals: 0,
        },
    );
    out
}

fn err_packet(code: u16, state: &str, message: &str) -> Vec<u8> {
    let mut payload = vec![0xFF];
    payload.extend_from_slice(&code.to_le_bytes());
    payload.push(b'#');
    payload.extend_from_slice(state.as_bytes());
    payload.extend_from_slice(message.as_bytes());
    payload
}

fn take<T: Clone>(future: &Future<T>) -> T {
    future
        .peek(|outcome| match outcome {
            Ok(value) => value.clone(),
            Err(err) => panic!("command failed: {}", err),
        })
        .expect("command still pending")
}

/// Prepare a statement without EOF packets and clear the sent bytes.
fn prepared(
    session: &mut BackendSession<Vec<u8>>,
    statement_id: u32,
    params: &[ColumnType],
    columns: &[(&str, ColumnType)],
) -> PreparedStatement {
    let future = session.prepare("SELECT ...").unwrap();
    session
        .on_packet(&prepare_ok(
            statement_id,
            columns.len() as u16,
            params.len() as u16,
        ))
        .unwrap();
    for param in params {
        session.on_packet(&definition("?", *param)).unwrap();
    }
    for (name, column_type) in columns {
        session.on_packet(&definition(name, *column_type)).unwrap();
    }
    session.transport_mut().clear();
    take(&future)
}

#[test]
fn prepare_places_definitions_in_order() {
    let mut session = eof_session();
    let sql = "SELECT id, name, email FROM users WHERE id = ? AND name = ?";
    let future = session.prepare(sql).unwrap();

    let mut expected = Vec::new();
    frame(&mut expected, 0, &[&[0x16][..], sql.as_bytes()].concat());
    assert_eq!(session.transport(), &expected);
    assert!(session.is_busy());

    let ok = prepare_ok(1, 3, 2);
    let p1 = definition("?", ColumnType::MYSQL_TYPE_LONGLONG);
    let p2 = definition("?", ColumnType::MYSQL_TYPE_VAR_STRING);
    let c1 = definition("id", ColumnType::MYSQL_TYPE_LONGLONG);
    let c2 = definition("name", ColumnType::MYSQL_TYPE_VAR_STRING);
    let c3 = definition("email", ColumnType::MYSQL_TYPE_VAR_STRING);
    let response = framed(&[&ok, &p1, &p2, EOF, &c1, &c2, &c3]);
    session.feed(&response).unwrap();
    assert!(!future.is_completed());

    session.feed(&framed(&[EOF])).unwrap();
    assert!(future.is_success());
    assert!(!session.is_busy());

    let stmt = take(&future);
    assert_eq!(stmt.id(), 1);
    assert_eq!(
        stmt.params()
            .iter()
            .map(|p| p.column_type)
            .collect::<Vec<_>>(),
        vec![
            ColumnType::MYSQL_TYPE_LONGLONG,
            ColumnType::MYSQL_TYPE_VAR_STRING
        ]
    );
    assert_eq!(
        stmt.columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>(),
        vec!["id", "name", "email"]
    );
}

#[test]
fn prepare_without_eof_packets() {
    let mut session = deprecate_eof_session();
    let future = session.prepare("SELECT name FROM users WHERE id = ?").unwrap();

    session.on_packet(&prepare_ok(4, 1, 1)).unwrap();
    session
        .on_packet(&definition("?", ColumnType::MYSQL_TYPE_LONG))
        .unwrap();
    assert!(!future.is_completed());
    session
        .on_packet(&definition("name", ColumnType::MYSQL_TYPE_VAR_STRING))
        .unwrap();

    let stmt = take(&future);
    assert_eq!(stmt.id(), 4);
    assert_eq!(stmt.num_params(), 1);
    assert_eq!(stmt.num_columns(), 1);
    assert_eq!(stmt.columns()[0].name, "name");
}

#[test]
fn prepare_without_definitions_completes_on_ack() {
    let mut session = eof_session();
    let future = session.prepare("DO 1").unwrap();
    session.feed(&framed(&[&prepare_ok(2, 0, 0)])).unwrap();
    let stmt = take(&future);
    assert_eq!(stmt.num_params(), 0);
    assert_eq!(stmt.num_columns(), 0);
    assert!(!session.is_busy());
}

#[test]
fn continuations_run_once_whenever_registered() {
    let mut session = deprecate_eof_session();
    let future = session.prepare("SELECT 1").unwrap();

    let (tx, rx) = mpsc::channel();
    let early = tx.clone();
    future.on_complete(move |outcome| {
        early
            .send(("early", outcome.as_ref().map(PreparedStatement::id).ok()))
            .unwrap();
    });
    assert!(rx.try_recv().is_err());

    session.on_packet(&prepare_ok(11, 0, 0)).unwrap();
    assert_eq!(rx.try_recv().unwrap(), ("early", Some(11)));

    future.on_complete(move |outcome| {
        tx.send(("late", outcome.as_ref().map(PreparedStatement::id).ok()))
            .unwrap();
    });
    assert_eq!(rx.try_recv().unwrap(), ("late", Some(11)));
    assert!(rx.try_recv().is_err());
}

#[test]
fn missing_column_definitions_fail_at_end_of_sequence() {
    let mut session = deprecate_eof_session();
    let future = session.prepare("SELECT a, b, c FROM t").unwrap();
    session.on_packet(&prepare_ok(3, 3, 0)).unwrap();
    for name in ["a", "b"] {
        session
            .on_packet(&definition(name, ColumnType::MYSQL_TYPE_LONG))
            .unwrap();
    }
    assert!(!future.is_completed());

    session.end_of_sequence();
    assert!(!session.is_busy());
    let mismatch = future.peek(|outcome| {
        matches!(
            outcome,
            Err(Error::ProtocolCountMismatch {
                kind: DefinitionKind::Column,
                declared: 3,
                observed: 2,
            })
        )
    });
    assert_eq!(mismatch, Some(true));
}

#[test]
fn early_eof_fails_prepare() {
    let mut session = eof_session();
    let future = session.prepare("SELECT ? + ?").unwrap();
    let ok = prepare_ok(5, 0, 2);
    let p1 = definition("?", ColumnType::MYSQL_TYPE_LONG);
    session.feed(&framed(&[&ok, &p1, EOF])).unwrap();

    let mismatch = future.peek(|outcome| {
        matches!(
            outcome,
            Err(Error::ProtocolCountMismatch {
                kind: DefinitionKind::Parameter,
                declared: 2,
                observed: 1,
            })
        )
    });
    assert_eq!(mismatch, Some(true));
    assert!(!session.is_busy());
}

#[test]
fn server_error_fails_prepare() {
    let mut session = eof_session();
    let future = session.prepare("SELECT * FROM missing").unwrap();
    let err = err_packet(1146, "42S02", "Table 'app.missing' doesn't exist");
    session.feed(&framed(&[&err])).unwrap();

    let code = future.peek(|outcome| match outcome {
        Err(Error::ServerError(e)) => Some((e.error_code, e.sql_state.clone())),
        _ => None,
    });
    assert_eq!(code, Some(Some((1146, "42S02".to_string()))));
    assert!(future.is_failure());

    // the session accepts the next command
    session.prepare("SELECT 1").unwrap();
}

#[test]
fn one_command_at_a_time() {
    let mut session = eof_session();
    let _future = session.prepare("SELECT 1").unwrap();
    assert!(matches!(
        session.prepare("SELECT 2"),
        Err(Error::PrepareInFlight)
    ));
    assert!(matches!(session.query("SELECT 3"), Err(Error::PrepareInFlight)));

    let mut session = eof_session();
    let _future = session.query("SELECT 1").unwrap();
    assert!(matches!(
        session.prepare("SELECT 2"),
        Err(Error::CommandInFlight)
    ));
}

#[test]
fn long_data_is_sent_before_execute() {
    let mut session = deprecate_eof_session();
    let mut stmt = prepared(
        &mut session,
        1,
        &[ColumnType::MYSQL_TYPE_LONGLONG, ColumnType::MYSQL_TYPE_BLOB],
        &[],
    );

    for chunk in [&b"ab"[..], b"cd", b"ef"] {
        session.send_long_data(&mut stmt, 1, chunk).unwrap();
    }
    assert_eq!(stmt.long_data(1), Some(&b"abcdef"[..]));
    assert!(session.transport().is_empty());
    assert!(matches!(
        session.send_long_data(&mut stmt, 2, b"x"),
        Err(Error::ParameterIndexOutOfRange { index: 2, count: 2 })
    ));

    let params = [BindValue::SignedInt(5), BindValue::LongData];
    let future = session.execute(&mut stmt, &params).unwrap();

    let sent = session.transport().clone();
    let mut long_data = vec![13, 0, 0, 0, 0x18, 1, 0, 0, 0, 1, 0];
    long_data.extend_from_slice(b"abcdef");
    assert_eq!(&sent[..long_data.len()], &long_data[..]);

    let execute = &sent[long_data.len()..];
    assert_eq!(&execute[..4], &[24, 0, 0, 0]);
    assert_eq!(
        &execute[4..],
        &[
            0x17, 1, 0, 0, 0, // statement id
            0x00, 1, 0, 0, 0, // no cursor, one iteration
            0x00, // NULL bitmap
            0x01, // types follow
            0x08, 0x00, 0xFC, 0x00, // LONGLONG, BLOB
            5, 0, 0, 0, 0, 0, 0, 0,
        ]
    );
    assert_eq!(stmt.long_data(1), None);

    session.on_packet(OK).unwrap();
    assert!(matches!(take(&future), ExecuteOutcome::Ok(_)));

    // same types again: no chunks, no types
    session.transport_mut().clear();
    let future = session.execute(&mut stmt, &params).unwrap();
    let sent = session.transport().clone();
    assert_eq!(&sent[..11], &[7, 0, 0, 0, 0x18, 1, 0, 0, 0, 1, 0]);
    assert_eq!(&sent[11..15], &[20, 0, 0, 0]);
    assert_eq!(sent[11 + 4 + 11], 0x00);
    session.on_packet(OK).unwrap();
    assert!(future.is_success());
}

#[test]
fn execute_checks_parameter_count() {
    let mut session = deprecate_eof_session();
    let mut stmt = prepared(
        &mut session,
        1,
        &[ColumnType::MYSQL_TYPE_LONG, ColumnType::MYSQL_TYPE_LONG],
        &[],
    );
    assert!(matches!(
        session.execute(&mut stmt, &[BindValue::from(1)]),
        Err(Error::ParameterCountMismatch {
            expected: 2,
            got: 1
        })
    ));
    assert!(!session.is_busy());
    assert!(session.transport().is_empty());
}

#[test]
fn execute_collects_binary_rows() {
    let mut session = eof_session();
    let future = session.prepare("SELECT id, name FROM users").unwrap();
    let ok = prepare_ok(8, 2, 0);
    let id = definition("id", ColumnType::MYSQL_TYPE_LONGLONG);
    let name = definition("name", ColumnType::MYSQL_TYPE_VAR_STRING);
    session.feed(&framed(&[&ok, &id, &name, EOF])).unwrap();
    let mut stmt = take(&future);
    session.transport_mut().clear();

    let future = session.execute(&mut stmt, &[]).unwrap();
    assert_eq!(
        session.transport(),
        &vec![10, 0, 0, 0, 0x17, 8, 0, 0, 0, 0, 1, 0, 0, 0]
    );

    let mut row1 = vec![0x00, 0x00];
    row1.extend_from_slice(&1i64.to_le_bytes());
    row1.extend_from_slice(&[3, b'a', b'n', b'n']);
    let mut row2 = vec![0x00, 0b0000_1000];
    row2.extend_from_slice(&2i64.to_le_bytes());
    session
        .feed(&framed(&[&[0x02], &id, &name, EOF, &row1, &row2, EOF]))
        .unwrap();

    let collector = match take(&future) {
        ExecuteOutcome::ResultSet(collector) => collector,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(collector.column_count(), 2);
    assert_eq!(collector.row_count(), 2);
    let rows: Vec<_> = collector.into_rows().collect();
    assert_eq!(
        rows,
        vec![
            vec![Value::SignedInt(1), Value::Bytes(b"ann".to_vec())].into_boxed_slice(),
            vec![Value::SignedInt(2), Value::Null].into_boxed_slice(),
        ]
    );
}

#[test]
fn query_collects_text_rows() {
    let mut session = eof_session();
    let future = session.query("SELECT n FROM t").unwrap();
    let mut expected = Vec::new();
    frame(&mut expected, 0, b"\x03SELECT n FROM t");
    assert_eq!(session.transport(), &expected);

    let n = definition("n", ColumnType::MYSQL_TYPE_LONGLONG);
    session
        .feed(&framed(&[&[0x01], &n, EOF, &[0x02, b'4', b'2'], &[0xFB], EOF]))
        .unwrap();

    match take(&future) {
        ExecuteOutcome::ResultSet(collector) => {
            assert_eq!(collector.columns()[0].name, "n");
            assert_eq!(
                collector.column_values(0),
                Some(&[Value::SignedInt(42), Value::Null][..])
            );
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn query_without_result_set() {
    let mut session = deprecate_eof_session();
    let future = session.query("UPDATE t SET n = 0").unwrap();
    session
        .on_packet(&[0x00, 0x03, 0x00, 0x02, 0x00, 0x00, 0x00])
        .unwrap();
    match take(&future) {
        ExecuteOutcome::Ok(ok) => assert_eq!(ok.affected_rows, 3),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn query_server_error() {
    let mut session = deprecate_eof_session();
    let future = session.query("SELEC 1").unwrap();
    session
        .on_packet(&err_packet(1064, "42000", "You have an error in your SQL syntax"))
        .unwrap();
    assert_eq!(
        future.peek(|outcome| matches!(outcome, Err(Error::ServerError(e)) if e.error_code == 1064)),
        Some(true)
    );
}

#[test]
fn close_sends_command_without_response() {
    let mut session = deprecate_eof_session();
    let stmt = prepared(&mut session, 1, &[], &[]);
    session.close(stmt).unwrap();
    assert_eq!(session.transport(), &vec![5, 0, 0, 0, 0x19, 1, 0, 0, 0]);
    assert!(!session.is_busy());
}

#[test]
fn reset_discards_long_data() {
    let mut session = deprecate_eof_session();
    let mut stmt = prepared(&mut session, 1, &[ColumnType::MYSQL_TYPE_BLOB], &[]);
    session.send_long_data(&mut stmt, 0, b"partial").unwrap();

    let future = session.reset(&mut stmt).unwrap();
    assert_eq!(session.transport(), &vec![5, 0, 0, 0, 0x1a, 1, 0, 0, 0]);
    assert_eq!(stmt.long_data(0), None);
    assert!(!future.is_completed());

    session.on_packet(OK).unwrap();
    assert!(future.is_success());
}

#[test]
fn teardown_fails_command_in_flight() {
    let mut session = eof_session();
    let future = session.prepare("SELECT 1").unwrap();
    session.teardown("backend closed");

    assert!(!session.is_busy());
    assert_eq!(
        future.peek(|outcome| match outcome {
            Err(Error::Failed(reason)) => reason.clone(),
            other => panic!("unexpected outcome: {:?}", other.is_ok()),
        }),
        Some("backend closed".to_string())
    );

    // nothing in flight: no-op
    session.teardown("again");
}

#[test]
fn packet_without_command_is_rejected() {
    let mut session = eof_session();
    assert!(matches!(
        session.on_packet(OK),
        Err(Error::NoCommandInFlight)
    ));
}

#[test]
fn feed_reassembles_packets_byte_by_byte() {
    let mut session = eof_session();
    let future = session.prepare("SELECT id FROM users WHERE id = ?").unwrap();
    let ok = prepare_ok(21, 1, 1);
    let p1 = definition("?", ColumnType::MYSQL_TYPE_LONGLONG);
    let c1 = definition("id", ColumnType::MYSQL_TYPE_LONGLONG);
    let response = framed(&[&ok, &p1, EOF, &c1, EOF]);

    let (last, head) = response.split_last().unwrap();
    for byte in head {
        session.feed(std::slice::from_ref(byte)).unwrap();
    }
    assert!(!future.is_completed());
    session.feed(std::slice::from_ref(last)).unwrap();

    let stmt = take(&future);
    assert_eq!(stmt.id(), 21);
    assert_eq!(stmt.columns()[0].name, "id");
}

#[test]
fn failed_execute_keeps_long_data_and_types_pending() {
    init_tracing();
    let mut session = BackendSession::new(Flaky::default(), CAPABILITIES_PROTOCOL_41);
    let future = session.prepare("INSERT INTO files (body) VALUES (?)").unwrap();
    session.on_packet(&prepare_ok(1, 0, 1)).unwrap();
    session
        .on_packet(&definition("?", ColumnType::MYSQL_TYPE_BLOB))
        .unwrap();
    let mut stmt = take(&future);
    session.send_long_data(&mut stmt, 0, b"abc").unwrap();

    session.transport_mut().down = true;
    assert!(matches!(
        session.execute(&mut stmt, &[BindValue::LongData]),
        Err(Error::Failed(_))
    ));
    assert!(!session.is_busy());
    assert_eq!(stmt.long_data(0), Some(&b"abc"[..]));
    assert!(stmt.needs_rebind());

    let transport = session.transport_mut();
    transport.down = false;
    transport.sent.clear();
    let future = session.execute(&mut stmt, &[BindValue::LongData]).unwrap();
    let sent = session.transport().sent.clone();
    assert_eq!(
        &sent[..14],
        &[10, 0, 0, 0, 0x18, 1, 0, 0, 0, 0, 0, b'a', b'b', b'c']
    );
    // new-params-bound flag, then BLOB
    assert_eq!(&sent[14..18], &[14, 0, 0, 0]);
    assert_eq!(&sent[18 + 11..], &[0x01, 0xFC, 0x00]);
    assert_eq!(stmt.long_data(0), None);
    assert!(!stmt.needs_rebind());

    session.on_packet(OK).unwrap();
    assert!(future.is_success());
}

#[test]
fn trailing_results_stay_with_their_command() {
    let mut session = deprecate_eof_session();
    let call = session.query("CALL report()").unwrap();

    let n = definition("n", ColumnType::MYSQL_TYPE_LONGLONG);
    // one row, then a terminator announcing more results
    let packets: [&[u8]; 4] = [
        &[0x01],
        &n,
        b"\x015",
        &[0xFE, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00],
    ];
    for payload in packets {
        session.on_packet(payload).unwrap();
    }
    assert!(!call.is_completed());
    assert!(matches!(
        session.query("UPDATE t SET n = 0"),
        Err(Error::CommandInFlight)
    ));

    // trailing OK of the CALL
    session.on_packet(OK).unwrap();
    match take(&call) {
        ExecuteOutcome::ResultSet(collector) => {
            assert_eq!(collector.column_values(0), Some(&[Value::SignedInt(5)][..]));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let update = session.query("UPDATE t SET n = 0").unwrap();
    session
        .on_packet(&[0x00, 0x04, 0x00, 0x02, 0x00, 0x00, 0x00])
        .unwrap();
    match take(&update) {
        ExecuteOutcome::Ok(ok) => assert_eq!(ok.affected_rows, 4),
        other => panic!("unexpected outcome: {:?}", other),
    }
}
