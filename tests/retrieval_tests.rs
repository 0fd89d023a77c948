//! Retrieval and context assembly against ingested study material, using
//! the offline hash embedder end to end.

mod common;

use cadet_core::config::{AssemblerParams, CoreConfig};
use cadet_core::error::CoreError;
use cadet_core::providers::FixedGeneration;
use cadet_core::types::CertificateLevel;

use common::{engine_with, engine_with_bank, TestEngine};

async fn engine_with_corpus() -> TestEngine {
    let t = engine_with_bank(Vec::new());
    let corpus = [
        (
            "NCC Organization",
            CertificateLevel::A,
            "The motto of the NCC is Unity and Discipline. The corps was raised in 1948.",
        ),
        (
            "Foot Drill",
            CertificateLevel::A,
            "Savdhan brings the squad to attention. Vishram is the stand at ease position.",
        ),
        (
            "Map Reading",
            CertificateLevel::B,
            "Contour lines join points of equal height. A bearing is measured clockwise from north.",
        ),
        (
            "First Aid",
            CertificateLevel::B,
            "Splint a fracture before moving the casualty. Firm pressure stops bleeding.",
        ),
    ];
    for (topic, level, text) in corpus {
        t.engine.ingest_material(topic, level, text).await.unwrap();
    }
    t
}

#[tokio::test]
async fn related_material_leads_the_context() {
    let t = engine_with_corpus().await;

    let context = t
        .engine
        .assemble_context("What is the motto of the NCC?", None, None)
        .await
        .unwrap();

    assert!(
        context.starts_with("[NCC Organization | Certificate A]\n"),
        "context began with: {}",
        context.lines().next().unwrap_or_default()
    );
    assert!(context.contains("Unity and Discipline"));
}

#[tokio::test]
async fn level_filter_excludes_other_certificates() {
    let t = engine_with_corpus().await;

    let context = t
        .engine
        .assemble_context("How is a bearing measured on a map?", Some(CertificateLevel::B), None)
        .await
        .unwrap();
    assert!(context.contains("[Map Reading | Certificate B]"));
    assert!(!context.contains("Certificate A]"));

    let context = t
        .engine
        .assemble_context("What is the motto of the NCC?", Some(CertificateLevel::B), None)
        .await
        .unwrap();
    assert!(
        !context.contains("[NCC Organization | Certificate A]"),
        "A-certificate material leaked into a B-certificate query"
    );
}

#[tokio::test]
async fn top_k_caps_the_snippet_count() {
    let t = engine_with_corpus().await;

    let context = t
        .engine
        .assemble_context("attention position drill squad", None, Some(1))
        .await
        .unwrap();
    assert_eq!(context.matches("| Certificate").count(), 1);

    let context = t
        .engine
        .assemble_context("attention position drill squad", None, Some(4))
        .await
        .unwrap();
    assert!(context.matches("| Certificate").count() > 1);
}

#[tokio::test]
async fn empty_store_yields_empty_context_by_default() {
    let t = engine_with_bank(Vec::new());
    let context = t.engine.assemble_context("anything at all", None, None).await.unwrap();
    assert!(context.is_empty());
}

#[tokio::test]
async fn empty_store_is_an_error_when_context_is_required() {
    let config = CoreConfig {
        assembler: AssemblerParams { require_context: true, ..Default::default() },
        ..Default::default()
    };
    let t = engine_with(config, Vec::new(), FixedGeneration::default());

    let err = t.engine.assemble_context("anything at all", None, None).await.unwrap_err();
    assert!(matches!(err, CoreError::NoContextAvailable));
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let t = engine_with_corpus().await;
    let err = t.engine.assemble_context("   ", None, None).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidArgument(_)));
}

#[tokio::test]
async fn tight_budget_keeps_whole_snippets_only() {
    let config = CoreConfig {
        assembler: AssemblerParams { max_context_bytes: 120, ..Default::default() },
        ..Default::default()
    };
    let t = engine_with(config, Vec::new(), FixedGeneration::default());
    t.engine
        .ingest_material("Foot Drill", CertificateLevel::A, "Savdhan brings the squad to attention.")
        .await
        .unwrap();
    t.engine
        .ingest_material(
            "Foot Drill",
            CertificateLevel::A,
            "Vishram is the stand at ease position for the squad on parade.",
        )
        .await
        .unwrap();

    let context = t
        .engine
        .assemble_context("squad attention savdhan", None, Some(5))
        .await
        .unwrap();

    assert!(context.len() <= 120);
    assert_eq!(context.matches("| Certificate").count(), 1, "only one snippet fits the budget");
    assert!(
        context.ends_with('.'),
        "snippet was cut mid-sentence: {context:?}"
    );
}
