use super::headers::{Headers, names};

#[test]
fn test_headers_case_insensitive_lookup() {
    let mut headers = Headers::new();
    headers.insert("Content-Type", "application/sdp");

    assert_eq!(headers.get("content-type"), Some("application/sdp"));
    assert_eq!(headers.get("CONTENT-TYPE"), Some("application/sdp"));
    assert!(headers.contains("Content-type"));
}

#[test]
fn test_headers_replace_keeps_single_entry() {
    let mut headers = Headers::new();
    headers.insert("CSeq", "1");
    headers.insert("Session", "ABC");
    headers.insert("cseq", "2");

    assert_eq!(headers.len(), 2);
    assert_eq!(headers.cseq(), Some(2));
    // replaced header keeps its slot
    assert_eq!(headers.iter().next(), Some(("cseq", "2")));
}

#[test]
fn test_headers_preserve_insertion_order() {
    let headers: Headers = vec![
        ("CSeq".to_string(), "3".to_string()),
        ("User-Agent".to_string(), "test".to_string()),
        ("DACP-ID".to_string(), "1234".to_string()),
    ]
    .into_iter()
    .collect();

    let keys: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["CSeq", "User-Agent", "DACP-ID"]);
}

#[test]
fn test_session_strips_parameters() {
    let mut headers = Headers::new();
    headers.insert(names::SESSION, "DEADBEEF;timeout=60");
    assert_eq!(headers.session(), Some("DEADBEEF"));

    headers.insert(names::SESSION, "  ");
    assert_eq!(headers.session(), None);
}

#[test]
fn test_content_length_parse() {
    let mut headers = Headers::new();
    headers.insert(names::CONTENT_LENGTH, " 42 ");
    assert_eq!(headers.content_length(), Some(42));

    headers.insert(names::CONTENT_LENGTH, "abc");
    assert_eq!(headers.content_length(), None);
}

#[test]
fn test_remove_header() {
    let mut headers = Headers::new();
    headers.insert("Apple-Response", "abc");
    assert_eq!(headers.remove("apple-response").as_deref(), Some("abc"));
    assert!(headers.is_empty());
}
