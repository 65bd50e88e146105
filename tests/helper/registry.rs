//! Registry test utilities backed by a mockito server

use mockito::{Mock, ServerGuard};
use serde_json::{Map, Value, json};

use crate::helper::fixture::tgz;

/// One published release served by the mock registry
pub struct ReleaseFixture<'a> {
    pub version: &'a str,
    /// Minimum Unity version, e.g. `2020.1`
    pub unity: &'a str,
    pub files: Vec<(&'a str, &'a str)>,
    /// How often the archive is expected to be downloaded
    pub downloads: usize,
}

pub struct ServedPackage {
    pub descriptor: Mock,
    pub tarballs: Vec<Mock>,
}

impl ServedPackage {
    pub async fn assert(&self) {
        self.descriptor.assert_async().await;
        for tarball in &self.tarballs {
            tarball.assert_async().await;
        }
    }
}

/// Serves the release list at `/<package_id>` and one archive per release.
/// The release list is expected to be fetched exactly `list_fetches` times.
pub async fn serve_package(
    server: &mut ServerGuard,
    package_id: &str,
    releases: &[ReleaseFixture<'_>],
    list_fetches: usize,
) -> ServedPackage {
    let mut versions = Map::new();
    let mut tarballs = Vec::new();

    for release in releases {
        let path = format!("/tarballs/{}-{}.tgz", package_id, release.version);
        versions.insert(
            release.version.to_string(),
            json!({
                "name": package_id,
                "version": release.version,
                "unity": release.unity,
                "dist": { "tarball": format!("{}{}", server.url(), path) }
            }),
        );

        let tarball = server
            .mock("GET", path.as_str())
            .with_status(200)
            .with_header("content-type", "application/octet-stream")
            .with_body(tgz(&release.files))
            .expect(release.downloads)
            .create_async()
            .await;
        tarballs.push(tarball);
    }

    let payload = json!({ "name": package_id, "versions": Value::Object(versions) });
    let descriptor = server
        .mock("GET", format!("/{}", package_id).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(payload.to_string())
        .expect(list_fetches)
        .create_async()
        .await;

    ServedPackage {
        descriptor,
        tarballs,
    }
}
