//! Integration tests for Link-header pagination: following `next`
//! relations, the follow cap, and duplicate-relation handling.

use webfetch_core::{Operation, Orchestrator, PageBody, Session};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page_text(body: &PageBody) -> String {
    match body {
        PageBody::Buffered(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        other => panic!("expected buffered body, got: {other:?}"),
    }
}

fn follow_operation(max_follow: Option<u32>) -> Operation {
    Operation {
        follow_rel_link: true,
        maximum_follow_rel_link: max_follow.unwrap_or(u32::MAX),
        ..Operation::default()
    }
}

async fn mount_page(server: &MockServer, page_path: &str, body: &str, next: Option<String>) {
    let mut template = ResponseTemplate::new(200).set_body_bytes(body.as_bytes().to_vec());
    if let Some(next) = next {
        template = template.insert_header("Link", format!("<{next}>; rel=\"next\"").as_str());
    }
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(template)
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_follows_next_relations_until_none_remains() {
    let mock_server = MockServer::start().await;

    mount_page(&mock_server, "/page1", "one", Some("/page2".to_string())).await;
    mount_page(&mock_server, "/page2", "two", Some("/page3".to_string())).await;
    mount_page(&mock_server, "/page3", "three", None).await;

    let mut orchestrator = Orchestrator::new(Session::new(), follow_operation(None));
    let outcome = orchestrator
        .run(&format!("{}/page1", mock_server.uri()))
        .await
        .unwrap();

    let bodies: Vec<String> = outcome.pages.iter().map(|p| page_text(&p.body)).collect();
    assert_eq!(bodies, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_follow_cap_limits_followed_pages() {
    let mock_server = MockServer::start().await;

    mount_page(&mock_server, "/page1", "one", Some("/page2".to_string())).await;
    mount_page(&mock_server, "/page2", "two", Some("/page3".to_string())).await;
    // /page3 must never be requested.
    Mock::given(method("GET"))
        .and(path("/page3"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut orchestrator = Orchestrator::new(Session::new(), follow_operation(Some(1)));
    let outcome = orchestrator
        .run(&format!("{}/page1", mock_server.uri()))
        .await
        .unwrap();

    assert_eq!(outcome.pages.len(), 2);
    mock_server.verify().await;
}

#[tokio::test]
async fn test_follow_disabled_fetches_single_page() {
    let mock_server = MockServer::start().await;

    mount_page(&mock_server, "/page1", "one", Some("/page2".to_string())).await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut orchestrator = Orchestrator::new(Session::new(), Operation::default());
    let outcome = orchestrator
        .run(&format!("{}/page1", mock_server.uri()))
        .await
        .unwrap();

    assert_eq!(outcome.pages.len(), 1);
    mock_server.verify().await;
}

#[tokio::test]
async fn test_duplicate_next_relation_first_occurrence_wins() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    r#"</good>; rel="next", </bad>; rel="next", </previous>; rel="prev""#,
                )
                .set_body_bytes(b"start".to_vec()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/good", "good", None).await;
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut orchestrator = Orchestrator::new(Session::new(), follow_operation(None));
    let outcome = orchestrator
        .run(&format!("{}/start", mock_server.uri()))
        .await
        .unwrap();

    assert_eq!(outcome.pages.len(), 2);
    assert_eq!(page_text(&outcome.pages[1].body), "good");
    // The page exposes the full relation map for the caller.
    assert!(outcome.pages[0].links.contains_key("prev"));
    mock_server.verify().await;
}

#[tokio::test]
async fn test_followed_pages_carry_no_body() {
    let mock_server = MockServer::start().await;

    // The first page is POSTed with a body; the followed page must not
    // carry it along.
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", r#"</results?page=2>; rel="next""#)
                .set_body_bytes(b"first".to_vec()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/results"))
        .and(query_param("page", "2"))
        .and(wiremock::matchers::body_string(""))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"second".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let op = Operation {
        method: reqwest::Method::POST,
        body: Some(webfetch_core::Body::Text("query".to_string())),
        follow_rel_link: true,
        maximum_follow_rel_link: u32::MAX,
        ..Operation::default()
    };
    let mut orchestrator = Orchestrator::new(Session::new(), op);
    let outcome = orchestrator
        .run(&format!("{}/search", mock_server.uri()))
        .await
        .unwrap();

    assert_eq!(outcome.pages.len(), 2);
    assert_eq!(page_text(&outcome.pages[1].body), "second");
}
