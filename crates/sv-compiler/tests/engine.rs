//! End-to-end tests: filter text in, decisions out.

use sv_compiler::{compile_filter, compile_filter_list, parse_filter, CompileOptions, FilterCompiler};
use sv_core::filters::MatchContext;
use sv_core::selfie::{self, BucketSelfie, CategorySelfie, EngineSelfie, SlotSelfie};
use sv_core::url::{extract_host, Tokenizer, UrlTokenizer};
use sv_core::{
    CategoryBits, CompiledLines, Decision, Filter, FilterEngine, RedirectDirectives, RequestContext,
    SelfieError, DOT_TOKEN_HASH, NO_TOKEN_HASH,
};

fn build(list: &str) -> FilterEngine {
    let mut compiler = FilterCompiler::default();
    compiler.add_filter_list(list, &CompileOptions::new("test"));
    compiler.freeze()
}

fn request<'a>(url: &'a str, doc: &'a str, request_type: &'a str) -> RequestContext<'a> {
    let hostname = extract_host(url);
    RequestContext {
        url,
        doc_hostname: doc,
        hostname,
        request_type,
        is_third_party: sv_core::is_third_party(doc, hostname),
    }
}

fn decide(engine: &FilterEngine, url: &str) -> Decision {
    engine.match_request(&request(url, "site.org", "image"))
}

#[test]
fn hostname_anchor_matches_label_boundaries_only() {
    let engine = build("||ads.example.com^\n");
    assert_eq!(decide(&engine, "http://ads.example.com/x"), Decision::Block);
    assert_eq!(decide(&engine, "http://sub.ads.example.com/x"), Decision::Block);
    assert_eq!(decide(&engine, "http://badads.example.com/x"), Decision::NoMatch);
}

#[test]
fn hostname_anchored_path_matches_label_boundaries_only() {
    let engine = build("||ads.example.com/banner\n");
    assert_eq!(decide(&engine, "https://ads.example.com/banner.gif"), Decision::Block);
    assert_eq!(decide(&engine, "https://cdn.ads.example.com/banner.gif"), Decision::Block);
    assert_eq!(decide(&engine, "https://badads.example.com/banner.gif"), Decision::NoMatch);
}

#[test]
fn important_beats_exception() {
    let engine = build("/ad.js$important\n@@/ad.js\n");
    assert_eq!(decide(&engine, "http://x/ad.js"), Decision::Block);

    let engine = build("/ad.js\n@@/ad.js\n");
    assert_eq!(decide(&engine, "http://x/ad.js"), Decision::Allow);
}

#[test]
fn unmatched_request_is_no_match() {
    let engine = build("||ads.example.com^\n@@||cdn.example.com^\n");
    assert_eq!(decide(&engine, "https://www.example.org/"), Decision::NoMatch);
    // An exception alone never yields Allow
    assert_eq!(decide(&engine, "https://cdn.example.com/lib.js"), Decision::NoMatch);
}

#[test]
fn party_scoped_filters() {
    let engine = build("||tracker.com^$third-party\n||widget.com^$first-party\n");

    let third = request("https://tracker.com/p.gif", "news.org", "image");
    assert_eq!(engine.match_request(&third), Decision::Block);
    let first = request("https://tracker.com/p.gif", "www.tracker.com", "image");
    assert_eq!(engine.match_request(&first), Decision::NoMatch);

    let first = request("https://widget.com/w.js", "widget.com", "script");
    assert_eq!(engine.match_request(&first), Decision::Block);
    let third = request("https://widget.com/w.js", "news.org", "script");
    assert_eq!(engine.match_request(&third), Decision::NoMatch);
}

#[test]
fn typed_filters() {
    let engine = build("||cdn.com/lib$script\n");
    assert_eq!(
        engine.match_request(&request("https://cdn.com/lib.js", "site.org", "script")),
        Decision::Block
    );
    assert_eq!(
        engine.match_request(&request("https://cdn.com/lib.png", "site.org", "image")),
        Decision::NoMatch
    );
}

#[test]
fn origin_modifier() {
    let engine = build("/banner/*$domain=news.org|~sport.news.org\n");
    let url = "https://cdn.net/banner/1.gif";
    assert_eq!(engine.match_request(&request(url, "www.news.org", "image")), Decision::Block);
    assert_eq!(engine.match_request(&request(url, "sport.news.org", "image")), Decision::NoMatch);
    assert_eq!(engine.match_request(&request(url, "blog.org", "image")), Decision::NoMatch);
}

#[test]
fn csp_directives_aggregate() {
    let engine = build(
        "||example.com^$csp=script-src 'none'\n\
         ||example.com^$csp=img-src 'none',important\n\
         @@||example.com^$csp\n",
    );
    let out = engine.match_data("csp", "https://example.com/page");
    assert_eq!(out.directives, vec!["img-src 'none'"]);

    let engine = build("||example.com^$csp=script-src 'none'\n@@||example.com^$csp\n");
    assert!(engine.match_data("csp", "https://example.com/page").directives.is_empty());

    let engine = build("||example.com^$csp=script-src 'none'\n");
    assert_eq!(
        engine.match_data("csp", "https://example.com/page").directives,
        vec!["script-src 'none'"]
    );
    assert!(engine.match_data("csp", "https://other.com/").directives.is_empty());
}

#[test]
fn escalation_does_not_change_outcomes() {
    let urls = [
        "https://ads.example.com/a-banner",
        "https://ads.example.com/b-banner",
        "https://ads.example.com/c-banner",
        "https://ads.example.com/z-banner",
    ];
    let filters = [
        "||ads.example.com/a-",
        "||ads.example.com/b-",
        "||ads.example.com/c-",
        "||ads.example.com/d-",
        "||ads.example.com/e-",
    ];

    for n in 1..=filters.len() {
        let engine = build(&filters[..n].join("\n"));
        for (i, url) in urls.iter().enumerate() {
            let expected = if i < n && i < 3 { Decision::Block } else { Decision::NoMatch };
            assert_eq!(decide(&engine, url), expected, "{n} filters, {url}");
        }
    }
}

#[test]
fn denylisted_tokens_still_index() {
    let mut parsed = parse_filter("|http://www.com").unwrap();
    parsed.make_token();
    assert_ne!(parsed.token_hash, NO_TOKEN_HASH);
    assert!(!parsed.token.is_empty());

    let engine = build("|http://www.com\n");
    assert_eq!(decide(&engine, "http://www.com/x"), Decision::Block);
}

#[test]
fn duplicates_are_discarded() {
    let mut compiler = FilterCompiler::default();
    compiler.add_filter_list("||ads.example.com^\n||ads.example.com^\n", &CompileOptions::default());
    let engine = compiler.freeze();
    assert_eq!(engine.counts().accepted, 2);
    assert_eq!(engine.counts().discarded, 1);
    assert_eq!(engine.filter_count(), 1);
}

#[test]
fn badfilter_cancels_filter() {
    let engine = build("||ads.example.com/x\n||ads.example.com/x$badfilter\n");
    assert_eq!(decide(&engine, "https://ads.example.com/x"), Decision::NoMatch);
    assert_eq!(engine.filter_count(), 0);
}

#[test]
fn rejected_rules_do_not_abort_the_batch() {
    let engine = build("/x$bogus\n/ad[/\n||ads.example.com^\n");
    assert_eq!(engine.counts().rejected, 2);
    assert_eq!(decide(&engine, "https://ads.example.com/"), Decision::Block);
}

#[test]
fn compiled_form_round_trips() {
    let rules = [
        "||ads.example.com/banner",
        "/banner/*$domain=a.com|~b.a.com",
        "|https://track.",
        "/pixel.gif|",
        "/ad^x",
        "/\\.com\\/ads\\/[0-9]+/",
        "-ad-unit.",
    ];
    let urls = [
        "https://ads.example.com/banner.gif",
        "https://cdn.net/banner/1.gif",
        "https://track.example.net/t",
        "https://x.org/pixel.gif",
        "https://x.org/ad/x",
        "https://x.com/ads/123",
        "https://x.org/a-ad-unit.js",
        "https://x.org/nothing",
    ];
    let tokenizer = UrlTokenizer;

    for raw in rules {
        let mut parsed = parse_filter(raw).unwrap();
        parsed.make_token();
        let (_, compiled) = compile_filter(&parsed);
        let direct = Filter::from_compiled(compiled.clone());
        let encoded = serde_json::to_string(&compiled).unwrap();
        let decoded = Filter::from_compiled(serde_json::from_str(&encoded).unwrap());

        for url in urls {
            let tokenized = tokenizer.tokenize(url);
            let hostname = extract_host(&tokenized.url);
            let cx = MatchContext::new(&tokenized.url, "a.com", hostname);
            for token in &tokenized.tokens {
                assert_eq!(
                    direct.matches(&cx, token.start),
                    decoded.matches(&cx, token.start),
                    "{raw} at {url}"
                );
            }
        }
    }
}

#[test]
fn compiled_lines_reload_into_same_engine() {
    let list = "||ads.example.com^\n/banner/*$image\n@@||ads.example.com/ok\n";
    let compiled = compile_filter_list(list, &CompileOptions::new("list"));
    let reloaded = CompiledLines::from_text(&compiled.to_text()).unwrap();

    let mut compiler = FilterCompiler::default();
    compiler.add_compiled(&reloaded);
    let engine = compiler.freeze();
    assert_eq!(decide(&engine, "https://ads.example.com/x"), Decision::Block);
    assert_eq!(decide(&engine, "https://ads.example.com/ok"), Decision::Allow);
    assert_eq!(decide(&engine, "https://cdn.org/banner/1.png"), Decision::Block);
}

#[test]
fn selfie_restores_engine() {
    let engine = build("||ads.example.com^\n/banner/*$image\n||x.com^$csp=script-src 'none'\n");
    let bytes = engine.to_selfie().unwrap();
    let restored = FilterEngine::from_selfie(&bytes, Box::new(RedirectDirectives::new())).unwrap();
    assert_eq!(restored.counts(), engine.counts());
    assert_eq!(decide(&restored, "https://ads.example.com/x"), Decision::Block);
    assert_eq!(decide(&restored, "https://cdn.org/banner/1.png"), Decision::Block);
    assert_eq!(
        restored.match_data("csp", "https://x.com/").directives,
        vec!["script-src 'none'"]
    );

    let mut corrupt = bytes.clone();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;
    assert!(FilterEngine::from_selfie(&corrupt, Box::new(RedirectDirectives::new())).is_err());
}

/// Selfie whose checksum is valid but whose token slot payload is not.
fn selfie_with_slot(slot: SlotSelfie) -> Vec<u8> {
    selfie::encode(&EngineSelfie {
        categories: vec![CategorySelfie {
            bits: CategoryBits::BLOCK,
            slots: vec![(DOT_TOKEN_HASH, slot)],
        }],
        ..EngineSelfie::default()
    })
    .unwrap()
}

#[test]
fn malformed_selfie_keeps_prior_engine() {
    let mut engine = build("||ads.example.com^\n/banner/*$image\n");
    let before = engine.to_selfie().unwrap();

    let oversized_trie = vec![0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];
    let mut dangling_trie = vec![0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0];
    dangling_trie.extend_from_slice(&[b'a', 9, 0, 0, 0]);
    let crafted = [
        selfie_with_slot(SlotSelfie::HostnameDict(oversized_trie.clone())),
        selfie_with_slot(SlotSelfie::HostnameDict(dangling_trie)),
        selfie_with_slot(SlotSelfie::Bucket(BucketSelfie {
            filters: Vec::new(),
            prefix1_trie: Some(oversized_trie),
            hn_anchored_trie: None,
        })),
        selfie_with_slot(SlotSelfie::Bucket(BucketSelfie {
            filters: Vec::new(),
            prefix1_trie: None,
            hn_anchored_trie: Some(vec![1, 2, 3]),
        })),
    ];

    for bytes in &crafted {
        let err = engine.load_selfie(bytes).unwrap_err();
        assert!(matches!(err, SelfieError::Trie(_)), "{err}");
        assert!(FilterEngine::from_selfie(bytes, Box::new(RedirectDirectives::new())).is_err());

        assert_eq!(decide(&engine, "https://ads.example.com/x"), Decision::Block);
        assert_eq!(decide(&engine, "https://cdn.org/banner/1.png"), Decision::Block);
        assert_eq!(engine.to_selfie().unwrap(), before);
    }

    let bytes = selfie::frame_payload(b"{\"counts\":");
    assert!(matches!(engine.load_selfie(&bytes), Err(SelfieError::Json(_))));
    assert_eq!(decide(&engine, "https://ads.example.com/x"), Decision::Block);
}

#[test]
fn selfie_load_replaces_engine() {
    let mut engine = build("||ads.example.com^\n");
    let other = build("||tracker.net^\n").to_selfie().unwrap();
    engine.load_selfie(&other).unwrap();
    assert_eq!(decide(&engine, "https://ads.example.com/x"), Decision::NoMatch);
    assert_eq!(decide(&engine, "https://tracker.net/p.gif"), Decision::Block);
}

#[test]
fn redirect_directives_reach_the_engine() {
    let engine = build("||ads.example.com/ad.js$script,redirect=noopjs\n");
    assert_eq!(
        engine.redirects().compiled_rules(),
        vec!["*\tads.example.com\tscript\tads.example.com/ad.js\tnoopjs".to_string()]
    );
    let ctx = request("https://ads.example.com/ad.js", "site.org", "script");
    assert_eq!(engine.match_request(&ctx), Decision::Block);
}

#[test]
fn explanation_describes_the_filter() {
    let engine = build("||ads.example.com^$third-party\n");
    let (decision, explanation) =
        engine.explain_request(&request("https://ads.example.com/x", "site.org", "image"));
    assert_eq!(decision, Decision::Block);
    let explanation = explanation.unwrap();
    assert_eq!(explanation.raw, "||ads.example.com^$third-party");
    assert_eq!(explanation.result, 1);
}
