//! A frame loop that requests icons, lets some go idle, and watches the
//! cache reclaim them.
//!
//! Run with: cargo run -p vellum --example icon_frames

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use vellum::prelude::*;

/// A backend that hands out ids and logs what it is asked to do.
#[derive(Default)]
struct LoggingBackend {
    next_id: AtomicU64,
}

impl GpuBackend for LoggingBackend {
    fn create_texture(&self, image: &RawImage) -> TextureResult<RawTexture> {
        let native = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(native, width = image.width, height = image.height, "create");
        Ok(RawTexture {
            native,
            width: image.width,
            height: image.height,
            format: image.format,
        })
    }

    fn destroy_texture(&self, texture: RawTexture) {
        tracing::info!(native = texture.native, "destroy");
    }

    fn copy_region(
        &self,
        source: &RawTexture,
        region: Region,
        format: Option<PixelFormat>,
    ) -> TextureResult<RawTexture> {
        let native = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(RawTexture {
            native,
            width: region.width,
            height: region.height,
            format: format.unwrap_or(source.format),
        })
    }
}

fn main() {
    let source = Arc::new(MemorySource::new());
    for id in [60_001u32, 60_002, 60_003] {
        let path = vellum::textures::format_icon_path(id, "", true);
        source.insert(path, RawImage::transparent(40, 40));
    }

    let clock = Arc::new(ManualClock::new());
    let service = TextureService::builder()
        .with_logging(true)
        .with_cache(CacheConfig::new().with_clock(clock.clone()))
        .build(source, Arc::new(LoggingBackend::default()));

    // A pinned icon, a plain one, and one that is dropped straight away.
    let pinned = service
        .cache()
        .acquire_icon(IconLookup::new(60_001), true)
        .expect("icon 60001");
    let plain = service
        .cache()
        .acquire_icon(IconLookup::new(60_002), false)
        .expect("icon 60002");
    let dropped = service
        .cache()
        .acquire_icon(IconLookup::new(60_003), false)
        .expect("icon 60003");

    for handle in [&pinned, &plain, &dropped] {
        let texture = pollster::block_on(handle.loaded()).expect("load");
        println!("{} -> native {}", handle.key(), texture.native_handle());
    }
    drop(dropped);

    for frame in 0..4 {
        let report = service.tick();
        println!(
            "frame {frame}: freed {} released {} events {:?}",
            report.freed, report.released, report.events
        );
        clock.advance(Duration::from_millis(1000));
    }

    println!("{:#?}", service.cache().stats());
    println!("pinned resident: {}", pinned.texture().is_some());
    println!("plain resident: {}", plain.texture().is_some());

    drop(pinned);
    drop(plain);
    service.shutdown();
}
