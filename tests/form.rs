use std::{
    fs,
    path::{Path, PathBuf},
};

use futures::{stream, StreamExt};
use hyper_form_data::{
    Entry, Error, FieldSizePolicy, Form, LimitKind, Multipart, MultipartRequest, Options, Parser,
    Value,
};

fn upload_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "hyper_form_data-it-{}-{}",
        name,
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn dir_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir).unwrap().next().is_none()
}

fn field(name: &str, value: &str) -> String {
    format!(
        "--XyZ\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
        name, value
    )
}

fn file(name: &str, filename: &str, content: &str) -> String {
    format!(
        "--XyZ\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n{}\r\n",
        name, filename, content
    )
}

fn body(parts: &[String]) -> Vec<u8> {
    let mut out = parts.concat();
    out.push_str("--XyZ--\r\n");
    out.into_bytes()
}

fn parse_in_chunks(data: &[u8], size: usize, options: Options) -> Result<Form, Error> {
    let mut parser = Parser::new("XyZ", options)?;
    for chunk in data.chunks(size) {
        parser.feed(chunk);
    }
    parser.finish();

    let events: Vec<_> = parser.events().collect();
    Form::collect(events)
}

fn scalar(s: &str) -> Value<String> {
    Value::Scalar(s.to_string())
}

#[test]
fn repeated_field_becomes_list() {
    let data = "--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n\
                --B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n2\r\n--B--";

    let form = Form::from_bytes("B", data.as_bytes(), Options::new()).unwrap();

    assert_eq!(
        Some(&Value::List(vec!["1".to_string(), "2".to_string()])),
        form.fields.get("a")
    );
    assert!(form.files.is_empty());
}

#[test]
fn three_repeats_and_first_seen_order() {
    let data = body(&[
        field("z", "1"),
        field("a", "x"),
        field("z", "2"),
        field("z", "3"),
    ]);

    let form = Form::from_bytes("XyZ", &data, Options::new()).unwrap();

    assert_eq!(vec!["z", "a"], form.fields.keys().collect::<Vec<_>>());
    assert_eq!(
        vec!["1", "2", "3"],
        form.fields.get("z").unwrap().as_slice()
    );
    assert_eq!(Some(&scalar("x")), form.fields.get("a"));
}

#[test]
fn fields_and_files_are_separated() {
    let dir = upload_dir("separate");
    let data = body(&[
        field("title", "report"),
        file("doc", "x.txt", "hello"),
        field("tags", "a"),
        file("img", "y.png", "PNG"),
    ]);

    let form = Form::from_bytes("XyZ", &data, Options::with_upload_dir(&dir)).unwrap();

    assert_eq!(vec!["title", "tags"], form.fields.keys().collect::<Vec<_>>());
    assert_eq!(vec!["doc", "img"], form.files.keys().collect::<Vec<_>>());

    let doc = form.files.get("doc").unwrap().first().unwrap();
    assert_eq!(5, doc.size);
    assert_eq!("x.txt", doc.original_filename);
    assert_eq!("doc", doc.field_name);
    assert_eq!(Some("application/octet-stream".to_string()), doc.content_type);
    assert_eq!("hello", fs::read_to_string(&doc.path).unwrap());

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn empty_filename_is_a_field() {
    let dir = upload_dir("empty-filename");
    let data = body(&[file("upload", "", "")]);

    let form = Form::from_bytes("XyZ", &data, Options::with_upload_dir(&dir)).unwrap();

    assert!(form.files.is_empty());
    assert_eq!(Some(&scalar("")), form.fields.get("upload"));
    assert!(dir_is_empty(&dir));
}

#[test]
fn chunk_size_does_not_change_result() {
    let data = body(&[
        field("a", "line one\r\nline two"),
        file("f", "x.txt", "--XyZ is not a boundary here\r\n--XyZx"),
        field("a", ""),
        field("b", "\r\n--Xy"),
    ]);

    let whole_dir = upload_dir("chunks-whole");
    let whole_options = Options::with_upload_dir(&whole_dir);
    let whole = parse_in_chunks(&data, data.len(), whole_options).unwrap();

    for size in &[1, 2, 3, 7, 64] {
        let dir = upload_dir(&format!("chunks-{}", size));
        let split = parse_in_chunks(&data, *size, Options::with_upload_dir(&dir)).unwrap();

        assert_eq!(whole.fields, split.fields);

        let a = whole.files.get("f").unwrap().first().unwrap();
        let b = split.files.get("f").unwrap().first().unwrap();
        assert_eq!(a.size, b.size);
        assert_eq!(a.original_filename, b.original_filename);
        assert_eq!(fs::read(&a.path).unwrap(), fs::read(&b.path).unwrap());

        fs::remove_dir_all(dir).unwrap();
    }

    assert_eq!(
        "--XyZ is not a boundary here\r\n--XyZx",
        fs::read_to_string(&whole.files.get("f").unwrap().first().unwrap().path).unwrap()
    );
    assert_eq!(
        vec!["line one\r\nline two", ""],
        whole.fields.get("a").unwrap().as_slice()
    );
    assert_eq!(Some(&scalar("\r\n--Xy")), whole.fields.get("b"));

    fs::remove_dir_all(whole_dir).unwrap();
}

#[test]
fn file_limit_leaves_no_files_behind() {
    let dir = upload_dir("file-limit");
    let data = body(&[
        file("first", "a.bin", "12345"),
        file("second", "b.bin", "6789012345"),
    ]);
    let options = Options {
        max_files_size: 8,
        ..Options::with_upload_dir(&dir)
    };

    let mut parser = Parser::new("XyZ", options).unwrap();
    for chunk in data.chunks(4) {
        parser.feed(chunk);
    }
    parser.finish();

    let events: Vec<_> = parser.events().collect();
    assert_eq!(1, events.iter().filter(|e| e.is_terminal()).count());

    match Form::collect(events) {
        Err(Error::LimitExceeded {
            kind: LimitKind::File,
            limit: 8,
            ..
        }) => (),
        other => panic!("unexpected: {:?}", other),
    }
    assert!(dir_is_empty(&dir));

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn field_limit_reject_and_truncate() {
    let data = body(&[field("a", "0123456789")]);

    let reject = Options {
        max_fields_size: 4,
        ..Options::new()
    };
    match Form::from_bytes("XyZ", &data, reject) {
        Err(e) => {
            assert_eq!(Some(LimitKind::Field), e.limit_kind());
            assert_eq!(http::StatusCode::PAYLOAD_TOO_LARGE, e.status());
        }
        Ok(form) => panic!("unexpected: {:?}", form),
    }

    let truncate = Options {
        max_fields_size: 4,
        field_size_policy: FieldSizePolicy::Truncate,
        ..Options::new()
    };
    let form = Form::from_bytes("XyZ", &data, truncate).unwrap();
    assert_eq!(Some(&scalar("0123")), form.fields.get("a"));
}

#[test]
fn missing_terminal_boundary() {
    let data = field("a", "1");

    let mut parser = Parser::new("XyZ", Options::new()).unwrap();
    parser.feed(&data);
    parser.finish();

    let events: Vec<_> = parser.events().collect();
    assert!(!events
        .iter()
        .any(|e| matches!(e, hyper_form_data::Event::Complete)));

    match Form::collect(events) {
        Err(Error::UnexpectedEndOfStream) => (),
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn single_file_scenario() {
    let dir = upload_dir("scenario");
    let data = body(&[file("doc", "x.txt", "hello")]);

    let multipart = Multipart::new(
        stream::iter(vec![Ok::<_, String>(data)]),
        "XyZ",
        Options::with_upload_dir(&dir),
    )
    .unwrap();
    let form = futures::executor::block_on(Form::parse(multipart)).unwrap();

    let doc = form.files.get("doc").unwrap().first().unwrap();
    assert_eq!(5, doc.size);
    assert_eq!("x.txt", doc.original_filename);

    fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn hyper_request_upload() {
    let dir = upload_dir("hyper");
    let data = body(&[field("name", "ferris"), file("avatar", "crab.png", "png-bytes")]);

    let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
        data.chunks(5).map(|c| Ok(c.to_vec())).collect();
    let request = hyper::Request::builder()
        .header("content-type", "multipart/form-data; boundary=XyZ")
        .body(hyper::Body::wrap_stream(stream::iter(chunks)))
        .unwrap();

    let multipart = request
        .into_multipart_with_options(Options::with_upload_dir(&dir))
        .unwrap();
    let form = Form::parse(multipart).await.unwrap();

    assert_eq!(Some(&scalar("ferris")), form.fields.get("name"));
    let avatar = form.files.get("avatar").unwrap().first().unwrap();
    assert_eq!(9, avatar.size);
    assert_eq!("png-bytes", fs::read_to_string(&avatar.path).unwrap());

    fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn stream_failure_cleans_up() {
    let dir = upload_dir("stream-failure");
    let data = body(&[file("doc", "x.txt", "a fairly long upload body")]);

    let mut chunks: Vec<Result<Vec<u8>, String>> = vec![Ok(data[..data.len() - 12].to_vec())];
    chunks.push(Err("client went away".to_string()));

    let multipart = Multipart::new(
        stream::iter(chunks),
        "XyZ",
        Options::with_upload_dir(&dir),
    )
    .unwrap();

    match Form::parse(multipart).await {
        Err(Error::InnerStream(msg)) => assert!(msg.contains("client went away")),
        other => panic!("unexpected: {:?}", other),
    }
    assert!(dir_is_empty(&dir));

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn multipart_failure_removes_reported_files() {
    let dir = upload_dir("multipart-failure");
    let data = body(&[file("first", "a.bin", "12345"), file("second", "b.bin", "6789012345")]);
    let options = Options {
        max_files_size: 8,
        ..Options::with_upload_dir(&dir)
    };

    let multipart =
        Multipart::new(stream::iter(vec![Ok::<_, String>(data)]), "XyZ", options).unwrap();
    let entries: Vec<_> = futures::executor::block_on(multipart.collect());

    assert_eq!(2, entries.len());
    let stored = match entries[0] {
        Ok(Entry::File { ref file, .. }) => file.path.clone(),
        ref other => panic!("unexpected: {:?}", other),
    };
    match entries[1] {
        Err(ref e) => assert_eq!(Some(LimitKind::File), e.limit_kind()),
        ref other => panic!("unexpected: {:?}", other),
    }
    assert!(!stored.exists());
    assert!(dir_is_empty(&dir));

    fs::remove_dir_all(dir).unwrap();
}
