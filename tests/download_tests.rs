use crxview::download::chrome::ChromeDownloader;

#[test]
fn test_chrome_download_url_generation() {
    let downloader = ChromeDownloader::new().unwrap();
    let url = downloader.build_download_url("nkbihfbeogaeaoehlefnkodbefgpgknn");

    assert!(url.starts_with("https://clients2.google.com/service/update2/crx?"));
    assert!(url.contains("acceptformat=crx2,crx3"));
    assert!(url.ends_with("x=id%3Dnkbihfbeogaeaoehlefnkodbefgpgknn%26uc"));
}

#[test]
fn test_prod_version_override() {
    let downloader = ChromeDownloader::new().unwrap().with_prod_version("120.0.6099.71");
    let url = downloader.build_download_url("nkbihfbeogaeaoehlefnkodbefgpgknn");
    assert!(url.contains("prodversion=120.0.6099.71"));
}
