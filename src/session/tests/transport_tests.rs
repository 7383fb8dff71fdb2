use super::*;

#[test]
fn test_response_header_lookup_is_case_insensitive() {
    let resp = HttpResponse::new(302, "")
        .with_header("Location", "https://example.test/next")
        .with_header("Set-Cookie", "a=1")
        .with_header("set-cookie", "b=2");

    assert_eq!(resp.header("location"), Some("https://example.test/next"));
    assert_eq!(resp.header("LOCATION"), Some("https://example.test/next"));
    let cookies: Vec<&str> = resp.header_values("set-cookie").collect();
    assert_eq!(cookies, vec!["a=1", "b=2"]);
    assert_eq!(resp.header("content-type"), None);
}

#[test]
fn test_request_header_lookup() {
    let req = HttpRequest {
        method: Method::Post,
        url: "https://example.test/".to_string(),
        headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
        body: Some("x".to_string()),
        timeout: Duration::from_secs(1),
    };
    assert_eq!(req.header("content-type"), Some("text/plain"));
    assert_eq!(req.method.as_str(), "POST");
}

#[tokio::test]
async fn test_ureq_transport_reports_unreachable_host_as_transport_error() {
    let transport = UreqTransport::new();
    let request = HttpRequest {
        method: Method::Get,
        url: "http://127.0.0.1:1/".to_string(),
        headers: Vec::new(),
        body: None,
        timeout: Duration::from_secs(2),
    };

    let err = transport.execute(request).await.unwrap_err();
    assert!(
        matches!(err, SessionError::Transport { .. }),
        "expected transport error, got {:?}",
        err
    );
}

#[test]
fn test_header_values_outlive_the_lookup_name() {
    let resp = HttpResponse::new(200, "").with_header("Set-Cookie", "sid=1");

    let found = {
        let name = String::from("SET-COOKIE");
        resp.header(&name)
    };
    assert_eq!(found, Some("sid=1"));

    let values: Vec<&str> = {
        let name = String::from("set-cookie");
        resp.header_values(&name).collect()
    };
    assert_eq!(values, vec!["sid=1"]);
}
