mod common;

use common::{record, scalar, text, BatchFixture};
use simbrowse::*;
use std::path::Path;
use tempfile::tempdir;

fn sample() -> MatValue {
    record(vec![
        ("dt", scalar(2.5e-4)),
        ("label", text("run A")),
        (
            "fiber",
            record(vec![
                ("radius", MatValue::Numeric(NumericArray::from_f64(vec![1, 2], &[0.5, 0.75]))),
                (
                    "enabled",
                    MatValue::Logical(LogicalArray {
                        shape: vec![1, 1],
                        data: vec![1],
                    }),
                ),
                (
                    "tags",
                    MatValue::String(StringArray {
                        shape: vec![1, 2],
                        data: vec![Some("thin".to_string()), None],
                    }),
                ),
            ]),
        ),
        ("extra", MatValue::EmptyStruct),
    ])
}

fn validate() -> ReadOptions {
    ReadOptions { validate: true }
}

fn replace_once(path: &Path, from: &[u8], to: &[u8]) {
    assert_eq!(from.len(), to.len());
    let mut bytes = std::fs::read(path).unwrap();
    let at = bytes
        .windows(from.len())
        .position(|w| w == from)
        .expect("pattern present");
    bytes[at..at + to.len()].copy_from_slice(to);
    std::fs::write(path, bytes).unwrap();
}

/// Hand-assembled file with an unchecked header.
fn write_raw(path: &Path, header_json: &str, payload: &[u8]) {
    let mut bytes = MAGIC_BYTES.to_vec();
    bytes.extend_from_slice(&(header_json.len() as u32).to_le_bytes());
    bytes.extend_from_slice(header_json.as_bytes());
    bytes.extend_from_slice(payload);
    std::fs::write(path, bytes).unwrap();
}

#[test]
fn write_then_read_preserves_the_tree() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ws.gbf");
    let value = sample();

    write_workspace(&path, &value, &WriteOptions::default()).unwrap();
    let back = read_workspace(&path, &validate()).unwrap();
    assert_eq!(back, value);

    let header = read_workspace_header(&path, &validate()).unwrap();
    assert_eq!(header.magic, "GREDBIN");
    assert_eq!(header.version, VERSION);
    assert_eq!(header.root, "struct");
    assert_eq!(header.file_size, std::fs::metadata(&path).unwrap().len());
    assert!(header.field("fiber.radius").is_some());
    assert_eq!(header.field("extra").map(|f| f.kind.as_str()), Some("struct"));
}

#[test]
fn large_fields_are_compressed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("big.gbf");
    let data = vec![1.0f64; 4096];
    let value = record(vec![("grid", MatValue::Numeric(NumericArray::from_f64(vec![64, 64], &data)))]);

    write_workspace(&path, &value, &WriteOptions::default()).unwrap();
    let header = read_workspace_header(&path, &ReadOptions::default()).unwrap();
    let field = header.field("grid").unwrap();
    assert_eq!(field.compression, "zlib");
    assert!(field.csize < field.usize);
    assert_eq!(field.usize, 4096 * 8);

    assert_eq!(read_workspace(&path, &validate()).unwrap(), value);

    let plain = WriteOptions {
        compression: false,
        ..WriteOptions::default()
    };
    write_workspace(&path, &value, &plain).unwrap();
    let header = read_workspace_header(&path, &ReadOptions::default()).unwrap();
    assert_eq!(header.field("grid").unwrap().compression, "none");
}

#[test]
fn non_struct_root_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("single.gbf");
    let value = MatValue::Numeric(NumericArray::from_i32(vec![2, 2], &[1, 2, 3, 4]));

    write_workspace(&path, &value, &WriteOptions::default()).unwrap();
    assert_eq!(read_workspace_header(&path, &ReadOptions::default()).unwrap().root, "single");
    assert_eq!(read_workspace(&path, &validate()).unwrap(), value);
}

#[test]
fn single_variables_and_subtrees_can_be_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ws.gbf");
    let value = sample();
    write_workspace(&path, &value, &WriteOptions::default()).unwrap();

    let dt = read_workspace_var(&path, "dt", &validate()).unwrap();
    assert_eq!(dt, scalar(2.5e-4));

    let fiber = read_workspace_var(&path, "fiber", &validate()).unwrap();
    assert_eq!(Some(&fiber), value.get_path("fiber"));

    let err = read_workspace_var(&path, "fib", &validate()).unwrap_err();
    assert!(matches!(err, WorkspaceError::VarNotFound(v) if v == "fib"));
}

#[test]
fn header_tampering_is_detected_when_validating() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ws.gbf");
    write_workspace(&path, &sample(), &WriteOptions::default()).unwrap();
    // Char data is stored as UTF-16 code units in the payload.
    replace_once(&path, b"r\0u\0n\0 \0A\0", b"r\0u\0n\0 \0B\0");
    assert!(read_workspace_header(&path, &validate()).is_ok());
    assert!(matches!(
        read_workspace(&path, &validate()),
        Err(WorkspaceError::FieldCrcMismatch { ref name, .. }) if name == "label"
    ));

    write_workspace(&path, &sample(), &WriteOptions::default()).unwrap();
    replace_once(&path, b"\"root\":\"struct\"", b"\"root\":\"Struct\"");
    assert!(matches!(
        read_workspace(&path, &validate()),
        Err(WorkspaceError::HeaderCrcMismatch { .. })
    ));
    assert!(read_workspace(&path, &ReadOptions::default()).is_ok());
}

#[test]
fn non_workspace_files_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.gbf");
    std::fs::write(&path, b"NOTGBF\0\0\x02\0\0\0{}").unwrap();
    assert!(matches!(
        read_workspace(&path, &ReadOptions::default()),
        Err(WorkspaceError::Format(_))
    ));

    let missing = dir.path().join("missing.gbf");
    assert!(matches!(
        read_workspace(&missing, &ReadOptions::default()),
        Err(WorkspaceError::Io(_))
    ));
}

#[test]
fn unknown_kinds_become_opaque_leaves() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("opaque.gbf");
    let json = r#"{"format":"GBF","magic":"GREDBIN","version":1,"root":"struct","fields":[
        {"name":"when","kind":"datetime","class":"datetime","shape":1,"csize":0},
        {"name":"n","kind":"numeric","class":"double","shape":[1,1],"offset":0,"csize":8,"usize":"8"}
    ]}"#;
    write_raw(&path, json, &3.0f64.to_le_bytes());

    let value = read_workspace(&path, &validate()).unwrap();
    assert_eq!(value.get_path("n"), Some(&scalar(3.0)));
    match value.get_path("when") {
        Some(MatValue::Opaque { kind, shape, .. }) => {
            assert_eq!(kind, "datetime");
            assert_eq!(shape, &vec![1, 1]);
        }
        other => panic!("expected opaque leaf, got {other:?}"),
    }
    assert_eq!(value.get_path("when").unwrap().summary(), "[1 x 1] datetime (datetime)");
}

#[test]
fn session_reads_metadata_of_the_current_run() {
    let fx = BatchFixture::grid();
    let mut session = fx.session();
    session.goto(4).unwrap();

    let ws = session.current_record().unwrap().artifacts.workspace.clone();
    let meta = record(vec![
        ("E", scalar(3.0)),
        ("mesh", record(vec![("nx", scalar(128.0))])),
    ]);
    write_workspace(&ws, &meta, &WriteOptions::default()).unwrap();

    let view = session.metadata(&validate());
    let MetadataView::Available(decoded) = &view else {
        panic!("expected metadata, got {view:?}");
    };
    assert_eq!(decoded.record("mesh").and_then(|m| m.value("nx")), Some(&scalar(128.0)));
    assert_eq!(view.lines(), vec!["E       = 3", "mesh.nx = 128"]);
    assert!(session
        .current_record()
        .unwrap()
        .artifacts
        .existing()
        .contains(&(ArtifactKind::Workspace, true)));
}

#[test]
fn missing_or_corrupt_metadata_is_unavailable() {
    let fx = BatchFixture::grid();
    let mut session = fx.session();

    let view = session.metadata(&ReadOptions::default());
    assert!(matches!(view, MetadataView::Unavailable { ref reason } if reason.contains("not found")));

    session.goto(2).unwrap();
    let ws = session.current_record().unwrap().artifacts.workspace.clone();
    std::fs::write(&ws, b"garbage").unwrap();
    let view = session.metadata(&ReadOptions::default());
    assert!(!view.is_available());
    assert!(view.lines()[0].starts_with("metadata not available (malformed record"));

    write_workspace(&ws, &scalar(1.0), &WriteOptions::default()).unwrap();
    let err = load_metadata(&ws, &ReadOptions::default()).unwrap_err();
    assert!(matches!(err, DecodeError::MalformedRecord { ref path, .. } if path == "<root>"));
}

#[test]
fn huge_declared_shapes_fail_without_panicking() {
    let dir = tempdir().unwrap();
    for (kind, class) in [("numeric", "double"), ("char", "char"), ("string", "string")] {
        let path = dir.path().join(format!("{kind}.gbf"));
        let json = format!(
            r#"{{"format":"GBF","magic":"GREDBIN","version":1,"root":"struct","fields":[
                {{"name":"x","kind":"{kind}","class":"{class}","shape":[4611686018427387904,1],"offset":0,"csize":0}}
            ]}}"#
        );
        write_raw(&path, &json, &[]);

        assert!(matches!(read_workspace(&path, &ReadOptions::default()), Err(WorkspaceError::Format(_))));
        let err = load_metadata(&path, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedRecord { .. }), "{kind}: {err:?}");
    }
}

#[test]
fn leaf_and_struct_with_the_same_name_collide_in_either_order() {
    let dir = tempdir().unwrap();
    let leaf = r#"{"name":"a","kind":"numeric","class":"double","shape":[1,1],"offset":0,"csize":8}"#;
    let nested = r#"{"name":"a.b","kind":"numeric","class":"double","shape":[1,1],"offset":0,"csize":8}"#;

    for (i, order) in [[nested, leaf], [leaf, nested]].into_iter().enumerate() {
        let path = dir.path().join(format!("collide{i}.gbf"));
        let json = format!(
            r#"{{"format":"GBF","magic":"GREDBIN","version":1,"root":"struct","fields":[{},{}]}}"#,
            order[0], order[1]
        );
        write_raw(&path, &json, &1.0f64.to_le_bytes());
        match read_workspace(&path, &ReadOptions::default()) {
            Err(WorkspaceError::Format(msg)) => assert!(msg.contains("path collision"), "{msg}"),
            other => panic!("expected a collision, got {other:?}"),
        }
    }
}
