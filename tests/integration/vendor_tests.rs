use super::*;
use catalog_sweep::browser::BrowserLauncher;
use catalog_sweep::models::ProductRecord;
use catalog_sweep::vendors::{VendorRegistry, VendorScraper};
use rstest::rstest;

const CDN: &str = "https://cdn.msi.test";

#[tokio::test]
async fn test_msi_reads_listing_through_session() -> anyhow::Result<()> {
    let launcher = FakeLauncher::new(msi_site(CDN));
    let page = launcher.launch().await?;
    let msi = msi();
    let quartz = &msi.categories()[0];

    page.navigate(&msi.category_url(quartz)?, Duration::from_secs(1)).await?;
    let links = msi.product_links(page.as_ref(), quartz).await?;

    assert_eq!(
        links,
        vec![
            format!("{BASE}/quartz/calacatta-laza/"),
            format!("{BASE}/quartz/carrara-miste/"),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_msi_extracts_record_fields() -> anyhow::Result<()> {
    let launcher = FakeLauncher::new(msi_site(CDN));
    let page = launcher.launch().await?;
    let url = format!("{BASE}/granite/absolute-black/");

    page.navigate(&url, Duration::from_secs(1)).await?;
    let raw = msi().extract(page.as_ref()).await?;
    assert_eq!(raw.main_image, Some(format!("{CDN}/img/black.png")));

    let record = ProductRecord::from_raw(raw, "Granite", &url)?.expect("page has name and sku");
    assert_eq!(record.sku, "G-BLACK");
    assert_eq!(record.name, "Absolute Black");
    assert_eq!(record.material.as_deref(), Some("Granite"));
    assert_eq!(record.color.as_deref(), Some("Black"));
    assert_eq!(record.thickness.as_deref(), Some("3cm"));
    assert_eq!(record.images, vec![format!("{CDN}/img/black.png")]);
    assert_eq!(record.price, None);
    Ok(())
}

#[rstest]
#[case("msi", true)]
#[case("MSI", false)]
#[case("all", false)]
#[case("cambria", false)]
fn test_registry_lookup(#[case] id: &str, #[case] found: bool) {
    let registry = VendorRegistry::with_defaults();
    assert_eq!(registry.get(id).is_ok(), found);
}

#[test]
fn test_unknown_vendor_error_lists_valid_ids() {
    let registry = VendorRegistry::with_defaults();
    let message = match registry.get("cambria") {
        Err(e) => e.to_string(),
        Ok(_) => panic!("cambria is not a built-in vendor"),
    };

    assert!(message.contains("cambria"));
    assert!(message.contains("Available vendors: msi"));
}
