#[cfg(test)]
mod tests {
    use crate::arxiv::{
        ArxivClient, PaperRecord, PaperRepository, compose_search_query, normalize_paper_id,
        parse_atom_feed, relax_query,
    };
    use crate::config::ArxivConfig;
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: search_query=all:transformer</title>
  <id>http://arxiv.org/api/cHxbiOdZaP56ODnBPIenZhzg5f8</id>
  <updated>2024-01-10T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <updated>2023-08-02T00:41:18Z</updated>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All
      You Need</title>
    <summary>  The dominant sequence transduction models are based on complex recurrent
networks. We propose a new simple network architecture, the Transformer.
    </summary>
    <author>
      <name>Ashish Vaswani</name>
    </author>
    <author>
      <name>Noam Shazeer</name>
      <arxiv:affiliation>Google Brain</arxiv:affiliation>
    </author>
    <author>
      <name>Niki Parmar</name>
    </author>
    <author>
      <name>Jakob Uszkoreit</name>
    </author>
    <link href="http://arxiv.org/abs/1706.03762v7" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1706.03762v7" rel="related" type="application/pdf"/>
    <arxiv:primary_category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/hep-th/9901001v1</id>
    <published>1999-01-04T10:00:00Z</published>
    <title>Strings &amp; Branes</title>
    <summary>A short abstract.</summary>
    <author><name>Jane Doe</name></author>
    <category term="hep-th" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    const ERROR_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_1234</id>
    <title>Error</title>
    <summary>incorrect id format for 1234</summary>
  </entry>
</feed>"#;

    fn paper(authors: &[&str], abstract_text: &str) -> PaperRecord {
        PaperRecord {
            id: "2401.00001".to_string(),
            title: "A paper".to_string(),
            authors: authors.iter().map(|a| a.to_string()).collect(),
            published: None,
            abstract_text: abstract_text.to_string(),
            categories: vec![],
            url: "https://arxiv.org/abs/2401.00001".to_string(),
            pdf_url: None,
        }
    }

    #[test]
    fn test_parse_atom_feed_entries() {
        let papers = parse_atom_feed(SAMPLE_FEED).unwrap();
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.id, "1706.03762");
        assert_eq!(first.title, "Attention Is All You Need");
        assert_eq!(
            first.authors,
            vec![
                "Ashish Vaswani",
                "Noam Shazeer",
                "Niki Parmar",
                "Jakob Uszkoreit"
            ]
        );
        assert_eq!(first.published, NaiveDate::from_ymd_opt(2017, 6, 12));
        assert!(first.abstract_text.starts_with("The dominant sequence"));
        assert!(!first.abstract_text.contains('\n'));
        assert_eq!(first.categories, vec!["cs.CL", "cs.LG"]);
        assert_eq!(first.url, "https://arxiv.org/abs/1706.03762");
        assert_eq!(
            first.pdf_url.as_deref(),
            Some("http://arxiv.org/pdf/1706.03762v7")
        );
    }

    #[test]
    fn test_parse_atom_feed_old_style_id_and_entities() {
        let papers = parse_atom_feed(SAMPLE_FEED).unwrap();
        let second = &papers[1];

        assert_eq!(second.id, "hep-th/9901001");
        assert_eq!(second.title, "Strings & Branes");
        assert_eq!(second.authors, vec!["Jane Doe"]);
        assert!(second.pdf_url.is_none());
    }

    #[test]
    fn test_parse_atom_feed_skips_error_entries() {
        let papers = parse_atom_feed(ERROR_FEED).unwrap();
        assert!(papers.is_empty());
    }

    #[test]
    fn test_parse_atom_feed_empty_feed() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>empty</title></feed>"#;
        assert!(parse_atom_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_parse_atom_feed_malformed() {
        let xml = "<feed><entry><id>x</id></title></entry></feed>";
        assert!(parse_atom_feed(xml).is_err());
    }

    #[test]
    fn test_compose_search_query() {
        assert_eq!(compose_search_query("all:rlhf ", &[]), "all:rlhf");
        assert_eq!(
            compose_search_query("all:rlhf", &["cs.LG".to_string(), " cs.CL ".to_string()]),
            "all:rlhf AND (cat:cs.LG OR cat:cs.CL)"
        );
        assert_eq!(
            compose_search_query("all:rlhf", &["".to_string()]),
            "all:rlhf"
        );
    }

    #[test]
    fn test_normalize_paper_id() {
        assert_eq!(normalize_paper_id("2107.12345"), "2107.12345");
        assert_eq!(normalize_paper_id("2107.12345v2"), "2107.12345");
        assert_eq!(
            normalize_paper_id("http://arxiv.org/abs/2107.12345v3"),
            "2107.12345"
        );
        assert_eq!(
            normalize_paper_id("https://arxiv.org/pdf/2107.12345v1.pdf"),
            "2107.12345"
        );
        assert_eq!(
            normalize_paper_id("http://arxiv.org/abs/cond-mat/0102536v1"),
            "cond-mat/0102536"
        );
        // 不是版本后缀的 v 不应被截断
        assert_eq!(normalize_paper_id("solv-int/9901001"), "solv-int/9901001");
    }

    #[test]
    fn test_relax_query_from_fielded_query() {
        let relaxed = relax_query(
            "ti:\"graph neural networks\" AND abs:(molecule generation)",
            &[],
        )
        .unwrap();
        assert_eq!(relaxed, "graph OR neural OR networks OR molecule");
    }

    #[test]
    fn test_relax_query_prefers_keywords() {
        let keywords = vec![
            "diffusion".to_string(),
            "Diffusion".to_string(),
            "protein folding".to_string(),
        ];
        let relaxed = relax_query("all:\"diffusion protein folding\"", &keywords).unwrap();
        assert_eq!(relaxed, "diffusion OR protein OR folding");
    }

    #[test]
    fn test_relax_query_none_when_nothing_changes() {
        assert_eq!(relax_query("rlhf", &[]), None);
        assert_eq!(relax_query("AND OR", &[]), None);
        assert_eq!(relax_query("", &[]), None);
    }

    #[test]
    fn test_short_authors() {
        assert_eq!(paper(&[], "").short_authors(), "Unknown authors");
        assert_eq!(paper(&["A. One"], "").short_authors(), "A. One");
        assert_eq!(
            paper(&["A", "B", "C"], "").short_authors(),
            "A, B, C"
        );
        assert_eq!(
            paper(&["A", "B", "C", "D"], "").short_authors(),
            "A, B, C et al."
        );
    }

    #[test]
    fn test_first_sentence() {
        let p = paper(&[], "We study version 2.0 of X. Then we do more.");
        assert_eq!(p.first_sentence(200), "We study version 2.0 of X.");

        let p = paper(&[], "No terminal punctuation here");
        assert_eq!(p.first_sentence(200), "No terminal punctuation here");

        let p = paper(&[], "A rather long opening sentence. Second.");
        assert_eq!(p.first_sentence(8), "A rather…");
    }

    fn client_for(server: &MockServer) -> ArxivClient {
        ArxivClient::new(ArxivConfig {
            api_url: format!("{}/api/query", server.uri()),
            ..ArxivConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_search_sends_category_filtered_query() {
        let server = MockServer::start().await;
        let defaults = ArxivConfig::default();
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("search_query", "all:transformer AND (cat:cs.CL)"))
            .and(query_param("start", "0"))
            .and(query_param("max_results", "2"))
            .and(query_param("sortBy", defaults.sort_by.as_api_value()))
            .and(query_param("sortOrder", defaults.sort_order.as_api_value()))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_FEED))
            .expect(1)
            .mount(&server)
            .await;

        let papers = client_for(&server)
            .search("all:transformer", 2, &["cs.CL".to_string()])
            .await;

        let ids: Vec<&str> = papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1706.03762", "hep-th/9901001"]);
        assert_eq!(papers[0].title, "Attention Is All You Need");
    }

    #[tokio::test]
    async fn test_search_truncates_to_max_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_FEED))
            .mount(&server)
            .await;

        let papers = client_for(&server).search("all:transformer", 1, &[]).await;
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].id, "1706.03762");
    }

    #[tokio::test]
    async fn test_search_server_error_returns_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream unavailable"))
            .expect(1)
            .mount(&server)
            .await;

        let papers = client_for(&server).search("all:transformer", 5, &[]).await;
        assert!(papers.is_empty());
    }

    #[tokio::test]
    async fn test_search_malformed_body_returns_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<feed><entry><id>x</id></title></entry></feed>"),
            )
            .mount(&server)
            .await;

        let papers = client_for(&server).search("all:transformer", 5, &[]).await;
        assert!(papers.is_empty());
    }

    #[tokio::test]
    async fn test_get_paper_by_id_normalizes_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("id_list", "1706.03762"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_FEED))
            .expect(1)
            .mount(&server)
            .await;

        let paper = client_for(&server)
            .get_paper_by_id("https://arxiv.org/abs/1706.03762v7")
            .await
            .unwrap();
        assert_eq!(paper.id, "1706.03762");
    }

    #[tokio::test]
    async fn test_get_paper_by_id_reports_missing_paper() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>empty</title></feed>"#,
            ))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .get_paper_by_id("2401.99999")
            .await
            .unwrap_err();
        assert!(error.to_string().contains("paper not found: 2401.99999"));
    }
}
