use brc_traffic_reports::router::{NavigationPage, PageCategory, PageRouter, workflow_short_name};

#[test]
fn organism_urls_with_digits_route_to_organism() {
    let router = PageRouter::new();
    for tax_id in ["1", "9606", "5833", "1773"] {
        let category = router.classify(&format!("/data/organisms/{tax_id}"));
        match category {
            PageCategory::Organism(id) => assert_eq!(id.as_str(), tax_id),
            other => panic!("expected organism for {tax_id}, got {other:?}"),
        }
    }
}

#[test]
fn organism_urls_with_non_digits_do_not_route_to_organism() {
    let router = PageRouter::new();
    assert_eq!(
        router.classify("/data/organisms/homo-sapiens"),
        PageCategory::Unclassified
    );
    assert_eq!(
        router.classify("/data/organisms/9606/extra"),
        PageCategory::Unclassified
    );
}

#[test]
fn workflow_always_wins_over_assembly() {
    let router = PageRouter::new();
    let urls = [
        "/data/assemblies/GCA_001008285_1/workflow-github-com-iwc-workflows-rnaseq-pe-main",
        "/data/assemblies/GCF_000005845_2/workflow-x",
    ];
    for url in urls {
        assert!(
            matches!(router.classify(url), PageCategory::Workflow(_, _)),
            "expected workflow for {url}"
        );
    }
}

#[test]
fn plain_assembly_routes_to_assembly() {
    let router = PageRouter::new();
    match router.classify("/data/assemblies/GCA_001008285_1") {
        PageCategory::Assembly(id) => {
            assert_eq!(id.as_str(), "GCA_001008285_1");
            assert_eq!(id.accession(), "GCA_001008285.1");
        }
        other => panic!("expected assembly, got {other:?}"),
    }
    // Deeper non-workflow sub-paths stay unclassified.
    assert_eq!(
        router.classify("/data/assemblies/GCA_001008285_1/downloads"),
        PageCategory::Unclassified
    );
}

#[test]
fn pathogen_slug_is_single_segment() {
    let router = PageRouter::new();
    assert_eq!(
        router.classify("/data/priority-pathogens/mpox-clade-i"),
        PageCategory::PriorityPathogen("mpox-clade-i".to_string())
    );
    assert_eq!(
        router.classify("/data/priority-pathogens/mpox/clade-i"),
        PageCategory::Unclassified
    );
}

#[test]
fn navigation_set_is_exact() {
    let router = PageRouter::new();
    for page in NavigationPage::ALL {
        assert_eq!(
            router.classify(page.path()),
            PageCategory::Navigation(page),
            "navigation path {}",
            page.path()
        );
    }
    assert_eq!(router.classify("/data"), PageCategory::Unclassified);
    assert_eq!(router.classify("/learn/intro"), PageCategory::Unclassified);
}

#[test]
fn classification_is_deterministic() {
    let router = PageRouter::new();
    let url = "/data/assemblies/GCA_000001_1/workflow-rnaseq-main";
    assert_eq!(router.classify(url), router.classify(url));
}

#[test]
fn short_names_for_workflow_grouping() {
    assert_eq!(
        workflow_short_name("github-com-iwc-workflows-bacterial-genome-assembly-main"),
        "bacterial-genome-assembly"
    );
    assert_eq!(
        workflow_short_name("github-com-iwc-workflows-chipseq-pe-versions-3"),
        "chipseq-pe"
    );
    assert_eq!(workflow_short_name("no-suffix-here"), "unknown");
}
