//! End-to-end pipeline scenarios over the in-memory store and a mock server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pdfharvest::download::{DownloadSettings, Downloader};
use pdfharvest::extract::{DateExtractor, DateSettings, TextExtractor, TextSettings, UNKNOWN_DATE};
use pdfharvest::models::{doc_id, Document, Link, Location};
use pdfharvest::pdf::{PdfError, PdfMiner};
use pdfharvest::spider::{Spider, SpiderSettings};
use pdfharvest::store::{
    MemoryStore, Pool, SharedStore, POOL_DATE, POOL_PAGES, POOL_PDF, POOL_TEXT,
};

fn memory_store() -> SharedStore {
    Arc::new(MemoryStore::new())
}

fn spider_settings(max_depth: u32) -> SpiderSettings {
    SpiderSettings {
        max_depth,
        max_attempt: 3,
        max_threads: 2,
        limit_per_host: 3,
        timeout_minutes: 0,
    }
}

fn download_settings(dir: &Path) -> DownloadSettings {
    DownloadSettings {
        download_path: dir.to_path_buf(),
        max_attempt: 3,
        max_threads: 2,
        limit_per_host: 3,
        timeout_minutes: 0,
    }
}

fn write_seeds(dir: &Path, website: &str) -> PathBuf {
    let seeds_path = dir.join("seeds.json");
    let body = serde_json::json!([{ "website": website, "name": "Test Site", "code": "t01" }]);
    std::fs::write(&seeds_path, body.to_string()).unwrap();
    seeds_path
}

fn test_link(url: &str, website: &str) -> Link {
    Link {
        url: url.to_string(),
        website: website.to_string(),
        name: "Test Site".to_string(),
        code: "t01".to_string(),
        depth: 0,
        attempt: 0,
        kind: Default::default(),
        doc_id: None,
    }
}

struct StubMiner {
    coverage: f64,
    text: String,
}

impl PdfMiner for StubMiner {
    fn coverage(&self, _path: &Path) -> Result<f64, PdfError> {
        Ok(self.coverage)
    }

    fn page_texts(&self, _path: &Path) -> Result<Vec<String>, PdfError> {
        Ok(vec![self.text.clone()])
    }
}

/// Seed pointing straight at a PDF: one file on disk, one JSON record.
#[tokio::test]
async fn seed_pdf_flows_to_saved_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("P", "application/pdf"))
        .mount(&server)
        .await;

    let store = memory_store();
    let seed_url = format!("{}/a.pdf", server.uri());
    let work_dir = tempfile::tempdir().unwrap();
    let seeds_path = write_seeds(work_dir.path(), &seed_url);

    let spider = Spider::new(store.clone(), spider_settings(3));
    spider.load_seeds(&seeds_path).await.unwrap();
    spider.run().await.unwrap();

    let download_dir = tempfile::tempdir().unwrap();
    Downloader::new(store.clone(), download_settings(download_dir.path()))
        .run()
        .await
        .unwrap();

    let id = doc_id(&seed_url);
    let pdf_path = download_dir.path().join(format!("{}.pdf", id));
    assert_eq!(std::fs::read(&pdf_path).unwrap(), b"P");

    let miner = Arc::new(StubMiner {
        coverage: 0.9,
        text: "Signed on 3 March 2022; see earlier notice from 1 Jan 2020.".to_string(),
    });
    TextExtractor::new(
        store.clone(),
        miner,
        TextSettings {
            download_path: download_dir.path().to_path_buf(),
            max_processors: 1,
            max_threads: 2,
            timeout_minutes: 0,
        },
    )
    .run()
    .await
    .unwrap();

    let saved_dir = tempfile::tempdir().unwrap();
    DateExtractor::new(
        store.clone(),
        DateSettings {
            saved_path: saved_dir.path().to_path_buf(),
            max_processors: 1,
            max_threads: 2,
            timeout_minutes: 0,
        },
    )
    .run()
    .await
    .unwrap();

    let saved_json = std::fs::read_to_string(saved_dir.path().join(format!("{}.json", id))).unwrap();
    let value: serde_json::Value = serde_json::from_str(&saved_json).unwrap();
    assert_eq!(value["doc_id"], id);
    assert_eq!(value["origin_url"], seed_url);
    // First date mentioned wins, formatted DD/MM/YYYY.
    assert_eq!(value["publication_date"], "03/03/2022");
    assert_eq!(value["locations"][0]["name"], "Test Site");
    assert_eq!(value["locations"][0]["uid"], "t01");

    let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        ["doc_id", "locations", "origin_url", "publication_date", "text"]
    );
}

/// A PDF two hops below the seed is reachable at max_depth 2 but not 1.
#[tokio::test]
async fn depth_limit_bounds_discovery() {
    for (max_depth, expect_pdf) in [(1u32, false), (2u32, true)] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"<html><a href="/p2">page two</a></html>"#, "text/html"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/p2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"<html><a href="/a.pdf">report</a></html>"#, "text/html"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/a.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("P", "application/pdf"))
            .mount(&server)
            .await;

        let store = memory_store();
        let work_dir = tempfile::tempdir().unwrap();
        let seeds_path = write_seeds(work_dir.path(), &server.uri());

        let spider = Spider::new(store.clone(), spider_settings(max_depth));
        spider.load_seeds(&seeds_path).await.unwrap();
        spider.run().await.unwrap();

        let pdf_pool: Pool<Link> = Pool::new(store.clone(), POOL_PDF);
        assert_eq!(
            pdf_pool.size().await.unwrap(),
            u64::from(expect_pdf),
            "max_depth={}",
            max_depth
        );

        if expect_pdf {
            let download_dir = tempfile::tempdir().unwrap();
            Downloader::new(store.clone(), download_settings(download_dir.path()))
                .run()
                .await
                .unwrap();
            let pdf_url = format!("{}/a.pdf", server.uri());
            let pdf_path = download_dir.path().join(format!("{}.pdf", doc_id(&pdf_url)));
            assert!(pdf_path.is_file());
        }
    }
}

/// Cross-host HTML is fetched but never parsed; cross-host PDFs download.
#[tokio::test]
async fn cross_host_html_is_not_parsed() {
    let h1 = MockServer::start().await;
    let h2 = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"<html><a href="/y">deeper</a></html>"#, "text/html"),
        )
        .mount(&h2)
        .await;
    Mock::given(method("GET"))
        .and(path("/b.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("B", "application/pdf"))
        .mount(&h2)
        .await;

    let store = memory_store();
    let pages: Pool<Link> = Pool::new(store.clone(), POOL_PAGES);
    pages
        .add_many(&[
            test_link(&format!("{}/x", h2.uri()), &h1.uri()),
            test_link(&format!("{}/b.pdf", h2.uri()), &h1.uri()),
        ])
        .await
        .unwrap();

    let spider = Spider::new(store.clone(), spider_settings(3));
    spider.run().await.unwrap();

    // The page on h2 was fetched but /y was never extracted.
    assert_eq!(pages.size().await.unwrap(), 0);
    let fetched: Vec<String> = h2
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert!(fetched.contains(&"/x".to_string()));
    assert!(!fetched.contains(&"/y".to_string()));

    let pdf_pool: Pool<Link> = Pool::new(store.clone(), POOL_PDF);
    assert_eq!(pdf_pool.size().await.unwrap(), 1);
}

/// Three 503s exhaust the attempt budget: three GETs, then a dead link.
#[tokio::test]
async fn transient_503_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.pdf"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = memory_store();
    let pdf_url = format!("{}/a.pdf", server.uri());
    let pdf_pool: Pool<Link> = Pool::new(store.clone(), POOL_PDF);
    pdf_pool
        .add_many(&[test_link(&pdf_url, &server.uri())])
        .await
        .unwrap();

    let download_dir = tempfile::tempdir().unwrap();
    Downloader::new(store.clone(), download_settings(download_dir.path()))
        .run()
        .await
        .unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(pdf_pool.size().await.unwrap(), 0);
    let texts: Pool<Document> = Pool::new(store.clone(), POOL_TEXT);
    assert_eq!(texts.size().await.unwrap(), 0);
    assert_eq!(
        std::fs::read_dir(download_dir.path()).unwrap().count(),
        0,
        "no output file for a dead link"
    );
}

/// Downloading the same link twice overwrites the same file and collapses
/// to a single text-pool record.
#[tokio::test]
async fn repeated_download_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("P", "application/pdf"))
        .mount(&server)
        .await;

    let store = memory_store();
    let pdf_url = format!("{}/a.pdf", server.uri());
    let pdf_pool: Pool<Link> = Pool::new(store.clone(), POOL_PDF);
    let download_dir = tempfile::tempdir().unwrap();

    for _ in 0..2 {
        pdf_pool
            .add_many(&[test_link(&pdf_url, &server.uri())])
            .await
            .unwrap();
        Downloader::new(store.clone(), download_settings(download_dir.path()))
            .run()
            .await
            .unwrap();
    }

    let pdf_path = download_dir.path().join(format!("{}.pdf", doc_id(&pdf_url)));
    assert_eq!(std::fs::read(&pdf_path).unwrap(), b"P");
    let texts: Pool<Document> = Pool::new(store.clone(), POOL_TEXT);
    assert_eq!(texts.size().await.unwrap(), 1);
}

/// A scanned PDF carries the sentinel text and an unknown date to the end.
#[tokio::test]
async fn scanned_pdf_gets_unknown_date() {
    let store = memory_store();
    let texts: Pool<Document> = Pool::new(store.clone(), POOL_TEXT);
    texts
        .add_many(&[Document {
            doc_id: "scanned-doc".to_string(),
            locations: vec![Location {
                name: "Test Site".to_string(),
                uid: "t01".to_string(),
                url: "https://h1.example".to_string(),
            }],
            origin_url: "https://h1.example/scan.pdf".to_string(),
            text: None,
            publication_date: None,
        }])
        .await
        .unwrap();

    let download_dir = tempfile::tempdir().unwrap();
    let miner = Arc::new(StubMiner {
        coverage: 0.0,
        text: "never used".to_string(),
    });
    TextExtractor::new(
        store.clone(),
        miner,
        TextSettings {
            download_path: download_dir.path().to_path_buf(),
            max_processors: 1,
            max_threads: 2,
            timeout_minutes: 0,
        },
    )
    .run()
    .await
    .unwrap();

    let saved_dir = tempfile::tempdir().unwrap();
    DateExtractor::new(
        store.clone(),
        DateSettings {
            saved_path: saved_dir.path().to_path_buf(),
            max_processors: 1,
            max_threads: 2,
            timeout_minutes: 0,
        },
    )
    .run()
    .await
    .unwrap();

    let saved_json =
        std::fs::read_to_string(saved_dir.path().join("scanned-doc.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&saved_json).unwrap();
    assert_eq!(value["text"], "scanned PDF");
    assert_eq!(value["publication_date"], UNKNOWN_DATE);
}

/// Every published date is either DD/MM/YYYY or the unknown sentinel.
#[tokio::test]
async fn publication_date_format_holds() {
    let store = memory_store();
    let dates: Pool<Document> = Pool::new(store.clone(), POOL_DATE);
    let documents: Vec<Document> = [
        ("with-date", "Decision taken on 5 June 2021 in session."),
        ("without-date", "No temporal information here."),
    ]
    .iter()
    .map(|(id, text)| Document {
        doc_id: id.to_string(),
        locations: Vec::new(),
        origin_url: format!("https://h1.example/{}", id),
        text: Some(text.to_string()),
        publication_date: None,
    })
    .collect();
    dates.add_many(&documents).await.unwrap();

    let saved_dir = tempfile::tempdir().unwrap();
    DateExtractor::new(
        store.clone(),
        DateSettings {
            saved_path: saved_dir.path().to_path_buf(),
            max_processors: 1,
            max_threads: 2,
            timeout_minutes: 0,
        },
    )
    .run()
    .await
    .unwrap();

    let format = regex::Regex::new(r"^(\d{2}/\d{2}/\d{4}|\[UNKNOWN\])$").unwrap();
    for id in ["with-date", "without-date"] {
        let saved_json =
            std::fs::read_to_string(saved_dir.path().join(format!("{}.json", id))).unwrap();
        let value: serde_json::Value = serde_json::from_str(&saved_json).unwrap();
        assert!(format.is_match(value["publication_date"].as_str().unwrap()));
    }
    let with_date: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(saved_dir.path().join("with-date.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(with_date["publication_date"], "05/06/2021");
}
