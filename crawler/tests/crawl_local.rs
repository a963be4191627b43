use axum::response::Html;
use axum::routing::get;
use axum::Router;
use linkrank_core::{CrawlConfig, EngineConfig, SearchEngine, Store};
use linkrank_crawler::Crawler;
use url::Url;

const HOME: &str = r##"<html><head><title>Home</title></head><body>
<p>welcome home</p>
<a href="/a">about cats</a>
<a href="/b">bees</a>
<a href="/missing">gone</a>
<a href="/private/x">secret</a>
<a href="/#top">top</a>
</body></html>"##;

async fn serve() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    // same server under another host name
    let hub = format!(r#"<a href="/a">cats</a><a href="http://localhost:{}/b">mirror</a>"#, addr.port());
    let app = Router::new()
        .route("/", get(|| async { Html(HOME) }))
        .route("/a", get(|| async { Html(r#"<p>cats purr</p><a href="/c">more</a>"#) }))
        .route("/b", get(|| async { Html(r#"<p>bees buzz</p><a href="/">home</a>"#) }))
        .route("/c", get(|| async { Html("<p>deep page</p>") }))
        .route("/hub", get(move || async move { Html(hub) }))
        .route("/private/x", get(|| async { Html("<p>hidden</p>") }))
        .route("/robots.txt", get(|| async { "User-agent: *\nDisallow: /private\n" }));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

fn crawler(store: &Store) -> Crawler {
    let config = CrawlConfig { concurrency: 2, timeout_secs: 5, ..CrawlConfig::default() };
    Crawler::new(store.clone(), config).unwrap()
}

#[tokio::test]
async fn depth_one_fetches_only_seeds() {
    let seed = serve().await;
    let store = Store::temporary().unwrap();
    let summary = crawler(&store).crawl(&[seed.clone()], 1).await.unwrap();

    assert_eq!(summary.levels, 1);
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.indexed, 1);
    // /a /b /missing /private/x; the fragment link points back at the seed
    assert_eq!(summary.edges, 4);

    let a = store.lookup_document(seed.join("/a").unwrap().as_str()).unwrap().unwrap();
    assert!(!store.is_indexed(a).unwrap());
}

#[tokio::test]
async fn failures_are_skipped_and_recrawl_is_idempotent() {
    let seed = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let crawler = crawler(&store);

    let summary = crawler.crawl(&[seed.clone()], 3).await.unwrap();
    assert_eq!(summary.levels, 3);
    assert_eq!(summary.fetched, 4);
    assert_eq!(summary.indexed, 4);
    // 404 and robots.txt rejection
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.edges, 6);

    let doc = |path: &str| store.lookup_document(seed.join(path).unwrap().as_str()).unwrap().unwrap();
    assert!(store.is_indexed(doc("/c")).unwrap());
    assert!(!store.is_indexed(doc("/missing")).unwrap());
    assert!(!store.is_indexed(doc("/private/x")).unwrap());
    assert_eq!(store.inbound_count(doc("/")).unwrap(), 1);

    let again = crawler.crawl(&[seed.clone()], 3).await.unwrap();
    assert_eq!(again.fetched, 0);
    assert_eq!(again.skipped, 1);
    assert_eq!(again.edges, 0);
    assert_eq!(store.stats().unwrap().edges, 6);

    let engine = SearchEngine::new(store.clone(), EngineConfig::default());
    engine.rebuild_rank(&engine.config().rank).unwrap();
    let hits = engine.query("purr", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].url, seed.join("/a").unwrap().as_str());
}

#[tokio::test]
async fn same_host_only_keeps_edges_but_not_frontier() {
    let seed = serve().await;
    let store = Store::temporary().unwrap();
    let config = CrawlConfig { same_host_only: true, ..CrawlConfig::default() };
    let crawler = Crawler::new(store.clone(), config).unwrap();

    let summary = crawler.crawl(&[seed.join("/hub").unwrap()], 2).await.unwrap();
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.failed, 0);
    // hub -> a, hub -> mirror, a -> c
    assert_eq!(summary.edges, 3);

    let mirror = format!("http://localhost:{}/b", seed.port().unwrap());
    let doc = store.lookup_document(&mirror).unwrap().unwrap();
    assert!(!store.is_indexed(doc).unwrap());
    assert_eq!(store.inbound_count(doc).unwrap(), 1);
}

#[tokio::test]
async fn excessive_crawl_delay_fails_the_fetch() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/", get(|| async { Html("<p>slow host</p>") }))
        .route("/robots.txt", get(|| async { "User-agent: *\nCrawl-delay: 86400\n" }));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let seed = Url::parse(&format!("http://{addr}/")).unwrap();

    let store = Store::temporary().unwrap();
    let c = crawler(&store);
    let seeds = [seed.clone()];
    let crawl = c.crawl(&seeds, 1);
    let summary = tokio::time::timeout(std::time::Duration::from_secs(30), crawl).await.unwrap().unwrap();
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.failed, 1);
    assert!(store.lookup_document(seed.as_str()).unwrap().is_none());
}
