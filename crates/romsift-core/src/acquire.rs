use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::catalog::Catalog;
use crate::config::DownloadConfig;
use crate::error::RomsiftError;
use crate::models::{AcquisitionItem, Profile};
use crate::profiles::ProfileStore;

/// Which asset of a game is being transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Rom,
    Disk,
}

/// Snapshot handed to the progress callback before each transfer.
#[derive(Debug, Clone)]
pub struct Progress {
    /// 1-based position within the run.
    pub index: usize,
    pub total: usize,
    pub name: String,
    pub kind: AssetKind,
}

/// What a run produced: per-item failures, successes, and whether the
/// user pulled the plug partway through.
#[derive(Debug, Default)]
pub struct RunReport {
    pub errors: Vec<String>,
    pub completed: usize,
    pub cancelled: bool,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }

    /// Write the accumulated error lines to a log file, one per line.
    pub fn save(&self, path: &Path) -> Result<(), RomsiftError> {
        let mut out = self.errors.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        std::fs::write(path, out)?;
        Ok(())
    }
}

/// HTTP client for download-mode runs, with the configured timeout.
pub fn build_client(config: &DownloadConfig) -> Result<reqwest::Client, RomsiftError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Resolve the profile's selection into an ordered plan and run it.
pub async fn run_acquisition(
    catalog: &Catalog,
    store: &ProfileStore,
    profile_name: &str,
    config: &DownloadConfig,
    client: &reqwest::Client,
    progress: impl FnMut(&Progress) -> bool,
) -> Result<RunReport, RomsiftError> {
    let profile = store
        .get_profile(profile_name)?
        .ok_or_else(|| RomsiftError::Validation(format!("Unknown profile '{profile_name}'.")))?;
    let selected = store.list_selected(profile_name)?;
    let items = catalog.resolve_selection(&selected)?;
    run(&profile, &items, config, client, progress).await
}

/// Transfer every planned item into the profile's target folders,
/// sequentially and in plan order. Download mode fetches from the
/// configured mirror; local mode copies from the source folders,
/// overwriting existing files.
///
/// The callback is invoked before each transfer (rom, then companion
/// disk when present) and again for every received chunk while a
/// download is in flight; returning `false` stops the run after the
/// bytes already written, leaving a partial file for the transfer
/// that was cut short. Per-item failures are recorded and the run
/// moves on. An empty plan returns a clean report without touching
/// the filesystem.
pub async fn run(
    profile: &Profile,
    items: &[AcquisitionItem],
    config: &DownloadConfig,
    client: &reqwest::Client,
    mut progress: impl FnMut(&Progress) -> bool,
) -> Result<RunReport, RomsiftError> {
    check_folders(profile)?;

    let mut report = RunReport::default();
    if items.is_empty() {
        return Ok(report);
    }

    let base = if profile.online {
        Some(
            Url::parse(&config.base_url)
                .map_err(|e| RomsiftError::Config(format!("bad mirror URL: {e}")))?,
        )
    } else {
        None
    };

    info!(
        profile = %profile.name,
        items = items.len(),
        online = profile.online,
        "acquisition run started"
    );

    let total = items.len();
    'items: for (i, item) in items.iter().enumerate() {
        // The callback gates each transfer: once before the rom and,
        // when a companion disk exists, again before the disk.
        let snapshot = Progress {
            index: i + 1,
            total,
            name: item.name.clone(),
            kind: AssetKind::Rom,
        };
        if !progress(&snapshot) {
            report.cancelled = true;
            info!(at = i, total, "acquisition run cancelled");
            return Ok(report);
        }

        let rom_result = match &base {
            Some(base) => fetch_rom(base, client, profile, item, &snapshot, &mut progress).await,
            None => copy_rom(profile, item),
        };
        match rom_result {
            Ok(Transfer::Done) => {}
            Ok(Transfer::Cancelled) => {
                report.cancelled = true;
                info!(at = i, total, "acquisition run cancelled");
                return Ok(report);
            }
            Err(ItemError::Skip(msg)) => {
                warn!(game = %item.name, error = %msg, "item failed");
                report.errors.push(msg);
                continue 'items;
            }
            Err(ItemError::Fatal(e)) => return Err(e),
        }

        if let Some(disk) = &item.disk {
            let snapshot = Progress {
                index: i + 1,
                total,
                name: item.name.clone(),
                kind: AssetKind::Disk,
            };
            if !progress(&snapshot) {
                report.cancelled = true;
                info!(at = i, total, "acquisition run cancelled");
                return Ok(report);
            }
            let disk_result = match &base {
                Some(base) => {
                    fetch_disk(base, client, profile, item, disk, &snapshot, &mut progress).await
                }
                None => copy_disk(profile, item, disk),
            };
            match disk_result {
                Ok(Transfer::Done) => {}
                Ok(Transfer::Cancelled) => {
                    report.cancelled = true;
                    info!(at = i, total, "acquisition run cancelled");
                    return Ok(report);
                }
                Err(ItemError::Skip(msg)) => {
                    warn!(game = %item.name, error = %msg, "item failed");
                    report.errors.push(msg);
                    continue 'items;
                }
                Err(ItemError::Fatal(e)) => return Err(e),
            }
        }

        report.completed += 1;
    }

    info!(
        completed = report.completed,
        failed = report.errors.len(),
        "acquisition run finished"
    );
    Ok(report)
}

/// A per-item failure is logged and skipped; a fatal one aborts the run.
enum ItemError {
    Skip(String),
    Fatal(RomsiftError),
}

/// Whether a transfer ran to completion or the callback cut it short.
enum Transfer {
    Done,
    Cancelled,
}

async fn fetch_rom(
    base: &Url,
    client: &reqwest::Client,
    profile: &Profile,
    item: &AcquisitionItem,
    snapshot: &Progress,
    progress: &mut impl FnMut(&Progress) -> bool,
) -> Result<Transfer, ItemError> {
    let rom_url = asset_url(base, &format!("{}.zip", item.name))
        .map_err(|e| ItemError::Skip(format!("{}: {e}", item.name)))?;
    let rom_dest = Path::new(&profile.rom_target).join(format!("{}.zip", item.name));
    fetch_to(client, &rom_url, &rom_dest, snapshot, progress)
        .await
        .map_err(|e| ItemError::Skip(format!("{}: {e}", item.name)))
}

async fn fetch_disk(
    base: &Url,
    client: &reqwest::Client,
    profile: &Profile,
    item: &AcquisitionItem,
    disk: &str,
    snapshot: &Progress,
    progress: &mut impl FnMut(&Progress) -> bool,
) -> Result<Transfer, ItemError> {
    let disk_dir = Path::new(&profile.chd_target).join(&item.name);
    // A stale disk dir is replaced wholesale; failure here is
    // recoverable because the fetch below recreates the path.
    if let Err(e) = recreate_dir(&disk_dir) {
        warn!(game = %item.name, error = %e, "could not reset disk folder");
    }
    let disk_url = asset_url(base, &format!("{}/{disk}.chd", item.name))
        .map_err(|e| ItemError::Skip(format!("{}: {e}", item.name)))?;
    let disk_dest = disk_dir.join(format!("{disk}.chd"));
    fetch_to(client, &disk_url, &disk_dest, snapshot, progress)
        .await
        .map_err(|e| ItemError::Skip(format!("{} ({disk}.chd): {e}", item.name)))
}

fn copy_rom(profile: &Profile, item: &AcquisitionItem) -> Result<Transfer, ItemError> {
    let zip = format!("{}.zip", item.name);
    let src = Path::new(&profile.rom_source).join(&zip);
    let dest = Path::new(&profile.rom_target).join(&zip);
    std::fs::copy(&src, &dest)
        .map_err(|e| ItemError::Skip(format!("{}: copy {}: {e}", item.name, src.display())))?;
    debug!(game = %item.name, "rom copied");
    Ok(Transfer::Done)
}

fn copy_disk(
    profile: &Profile,
    item: &AcquisitionItem,
    disk: &str,
) -> Result<Transfer, ItemError> {
    let disk_dir = Path::new(&profile.chd_target).join(&item.name);
    // Unlike the download path, a dir we cannot create means every
    // later disk copy into it would fail too, so stop the run.
    recreate_dir(&disk_dir).map_err(|e| ItemError::Fatal(e.into()))?;
    let chd = format!("{disk}.chd");
    let disk_src = Path::new(&profile.chd_source).join(&item.name).join(&chd);
    std::fs::copy(&disk_src, disk_dir.join(&chd)).map_err(|e| {
        ItemError::Skip(format!("{}: copy {}: {e}", item.name, disk_src.display()))
    })?;
    debug!(game = %item.name, disk = %disk, "disk copied");
    Ok(Transfer::Done)
}

/// Stream the response body to `dest` chunk by chunk, polling the
/// callback after each write so a large transfer never buffers in
/// memory and can be abandoned while in flight.
async fn fetch_to(
    client: &reqwest::Client,
    url: &Url,
    dest: &Path,
    snapshot: &Progress,
    progress: &mut impl FnMut(&Progress) -> bool,
) -> Result<Transfer, RomsiftError> {
    use std::io::Write;

    debug!(url = %url, "downloading");
    let mut response = client.get(url.clone()).send().await?.error_for_status()?;
    let mut file = std::fs::File::create(dest)?;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)?;
        if !progress(snapshot) {
            debug!(url = %url, "transfer abandoned mid-flight");
            return Ok(Transfer::Cancelled);
        }
    }
    file.flush()?;
    Ok(Transfer::Done)
}

/// Join a relative asset path onto the mirror base URL.
fn asset_url(base: &Url, asset: &str) -> Result<Url, RomsiftError> {
    base.join(asset)
        .map_err(|e| RomsiftError::Config(format!("bad asset URL '{asset}': {e}")))
}

/// Remove the directory if present, then create it fresh.
fn recreate_dir(dir: &Path) -> Result<(), std::io::Error> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::fs::create_dir_all(dir)
}

/// Both target folders must exist up front; local profiles also need
/// their source folders.
fn check_folders(profile: &Profile) -> Result<(), RomsiftError> {
    let mut required: Vec<(&str, &str)> = vec![
        ("ROM target", &profile.rom_target),
        ("CHD target", &profile.chd_target),
    ];
    if !profile.online {
        required.push(("ROM source", &profile.rom_source));
        required.push(("CHD source", &profile.chd_source));
    }
    for (label, path) in required {
        if !Path::new(path).is_dir() {
            return Err(RomsiftError::Validation(format!(
                "{label} folder '{path}' does not exist."
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(name: &str) -> AcquisitionItem {
        AcquisitionItem {
            name: name.to_string(),
            disk: None,
        }
    }

    fn disk_item(name: &str, disk: &str) -> AcquisitionItem {
        AcquisitionItem {
            name: name.to_string(),
            disk: Some(disk.to_string()),
        }
    }

    struct LocalSetup {
        _dirs: Vec<TempDir>,
        profile: Profile,
    }

    fn local_setup() -> LocalSetup {
        let dirs: Vec<TempDir> = (0..4).map(|_| TempDir::new().unwrap()).collect();
        let p = |i: usize| dirs[i].path().to_str().unwrap().to_string();
        let profile = Profile {
            name: "Cab".to_string(),
            online: false,
            rom_source: p(0),
            chd_source: p(1),
            rom_target: p(2),
            chd_target: p(3),
        };
        LocalSetup {
            _dirs: dirs,
            profile,
        }
    }

    fn seed_rom(setup: &LocalSetup, name: &str) {
        std::fs::write(
            Path::new(&setup.profile.rom_source).join(format!("{name}.zip")),
            b"zip",
        )
        .unwrap();
    }

    fn config() -> DownloadConfig {
        DownloadConfig {
            base_url: "https://mirror.example/roms/".to_string(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn empty_plan_is_a_clean_noop() {
        let setup = local_setup();
        let report = run(
            &setup.profile,
            &[],
            &config(),
            &reqwest::Client::new(),
            |_| true,
        )
        .await
        .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.completed, 0);
    }

    #[tokio::test]
    async fn copies_roms_with_overwrite() {
        let setup = local_setup();
        seed_rom(&setup, "sf2");
        let dest = Path::new(&setup.profile.rom_target).join("sf2.zip");
        std::fs::write(&dest, b"stale").unwrap();

        let report = run(
            &setup.profile,
            &[item("sf2")],
            &config(),
            &reqwest::Client::new(),
            |_| true,
        )
        .await
        .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.completed, 1);
        assert_eq!(std::fs::read(&dest).unwrap(), b"zip");
    }

    #[tokio::test]
    async fn missing_source_is_logged_and_skipped() {
        let setup = local_setup();
        seed_rom(&setup, "good");

        let report = run(
            &setup.profile,
            &[item("gone"), item("good")],
            &config(),
            &reqwest::Client::new(),
            |_| true,
        )
        .await
        .unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("gone:"));
        assert!(Path::new(&setup.profile.rom_target).join("good.zip").exists());
    }

    #[tokio::test]
    async fn disk_folder_is_replaced_before_copy() {
        let setup = local_setup();
        seed_rom(&setup, "kinst");
        let chd_src_dir = Path::new(&setup.profile.chd_source).join("kinst");
        std::fs::create_dir_all(&chd_src_dir).unwrap();
        std::fs::write(chd_src_dir.join("kinst.chd"), b"chd").unwrap();

        let stale_dir = Path::new(&setup.profile.chd_target).join("kinst");
        std::fs::create_dir_all(&stale_dir).unwrap();
        std::fs::write(stale_dir.join("old.chd"), b"old").unwrap();

        let report = run(
            &setup.profile,
            &[disk_item("kinst", "kinst")],
            &config(),
            &reqwest::Client::new(),
            |_| true,
        )
        .await
        .unwrap();
        assert!(report.is_clean());
        assert!(stale_dir.join("kinst.chd").exists());
        assert!(!stale_dir.join("old.chd").exists());
    }

    #[tokio::test]
    async fn callback_cancels_between_items() {
        let setup = local_setup();
        seed_rom(&setup, "a");
        seed_rom(&setup, "b");

        let mut seen = Vec::new();
        let report = run(
            &setup.profile,
            &[item("a"), item("b")],
            &config(),
            &reqwest::Client::new(),
            |p| {
                seen.push((p.index, p.name.clone()));
                p.index < 2
            },
        )
        .await
        .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.completed, 1);
        assert_eq!(seen, vec![(1, "a".to_string()), (2, "b".to_string())]);
        assert!(Path::new(&setup.profile.rom_target).join("a.zip").exists());
        assert!(!Path::new(&setup.profile.rom_target).join("b.zip").exists());
    }

    #[tokio::test]
    async fn callback_cancels_before_the_companion_disk() {
        let setup = local_setup();
        seed_rom(&setup, "kinst");
        let chd_src_dir = Path::new(&setup.profile.chd_source).join("kinst");
        std::fs::create_dir_all(&chd_src_dir).unwrap();
        std::fs::write(chd_src_dir.join("kinst.chd"), b"chd").unwrap();

        let report = run(
            &setup.profile,
            &[disk_item("kinst", "kinst")],
            &config(),
            &reqwest::Client::new(),
            |p| p.kind == AssetKind::Rom,
        )
        .await
        .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.completed, 0);
        // The rom landed before the cancel, the disk did not.
        assert!(Path::new(&setup.profile.rom_target).join("kinst.zip").exists());
        assert!(!Path::new(&setup.profile.chd_target)
            .join("kinst")
            .join("kinst.chd")
            .exists());
    }

    #[tokio::test]
    async fn callback_cancels_while_a_download_is_in_flight() {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}/", listener.local_addr().unwrap());
        let part_len: usize = 64 * 1024;
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            let part = vec![b'x'; part_len];
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n",
                part_len * 4
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(&part);
            let _ = stream.flush();
            // Trickle the remainder so the client sees the first
            // chunk on its own.
            for _ in 0..3 {
                std::thread::sleep(std::time::Duration::from_millis(100));
                if stream.write_all(&part).is_err() {
                    break;
                }
            }
        });

        let rom_target = TempDir::new().unwrap();
        let chd_target = TempDir::new().unwrap();
        let profile = Profile {
            name: "Mirror".to_string(),
            online: true,
            rom_source: String::new(),
            chd_source: String::new(),
            rom_target: rom_target.path().to_str().unwrap().to_string(),
            chd_target: chd_target.path().to_str().unwrap().to_string(),
        };
        let cfg = DownloadConfig {
            base_url,
            timeout_secs: 5,
        };

        let mut calls = 0u32;
        let report = run(&profile, &[item("big")], &cfg, &reqwest::Client::new(), |_| {
            calls += 1;
            // First call gates the rom; the second arrives after the
            // first chunk has been written.
            calls < 2
        })
        .await
        .unwrap();
        server.join().unwrap();

        assert!(report.cancelled);
        assert_eq!(report.completed, 0);
        let partial = std::fs::metadata(rom_target.path().join("big.zip"))
            .unwrap()
            .len();
        assert!(partial > 0);
        assert!(partial < (part_len * 4) as u64); // cut short of the advertised body
    }

    #[tokio::test]
    async fn missing_target_folder_fails_before_any_transfer() {
        let mut setup = local_setup();
        seed_rom(&setup, "a");
        setup.profile.rom_target = "/no/such/dir".to_string();

        let err = run(
            &setup.profile,
            &[item("a")],
            &config(),
            &reqwest::Client::new(),
            |_| true,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RomsiftError::Validation(_)));
    }

    #[tokio::test]
    async fn local_profile_requires_source_folders() {
        let mut setup = local_setup();
        setup.profile.chd_source = "/no/such/dir".to_string();
        let err = run(
            &setup.profile,
            &[],
            &config(),
            &reqwest::Client::new(),
            |_| true,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RomsiftError::Validation(_)));
    }

    #[test]
    fn asset_urls_join_onto_the_mirror() {
        let base = Url::parse(&config().base_url).unwrap();
        assert_eq!(
            asset_url(&base, "sf2.zip").unwrap().as_str(),
            "https://mirror.example/roms/sf2.zip"
        );
        assert_eq!(
            asset_url(&base, "kinst/kinst.chd").unwrap().as_str(),
            "https://mirror.example/roms/kinst/kinst.chd"
        );
    }

    #[test]
    fn report_save_writes_one_line_per_error() {
        let dir = TempDir::new().unwrap();
        let report = RunReport {
            errors: vec!["a: nope".to_string(), "b: nope".to_string()],
            completed: 0,
            cancelled: false,
        };
        let path = dir.path().join("errors.log");
        report.save(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a: nope\nb: nope\n");
    }
}
