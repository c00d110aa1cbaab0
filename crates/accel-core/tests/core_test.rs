//! Integration tests for accel-core.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_relative_eq;
use accel_core::{
    Border, CpuImage, CpuImageFactory, DataType, Factory, Image, Processor, ProcessorConfig,
    SyncProcessor, ThreadPoolProcessor,
};

#[test]
fn test_factory_creates_zeroed_image() {
    let mut img = CpuImageFactory.create(5, 3, 2, DataType::Uint16);
    assert_eq!(img.width(), 5);
    assert_eq!(img.height(), 3);
    assert_eq!(img.channels(), 2);
    assert_eq!(img.size(), 5 * 3 * 2 * 2);
    let raw = img.read_raw();
    assert!(raw.is_resolved());
    assert!(raw.wait().iter().all(|&b| b == 0));
}

#[test]
fn test_raw_write_then_read() {
    let mut img = CpuImageFactory.create(4, 4, 4, DataType::Uint8);
    let data: Vec<u8> = (0..64).collect();
    assert!(img.write_raw(&data).is_resolved());
    assert_eq!(img.read_raw().wait(), data);

    let cpu = img.as_any().downcast_ref::<CpuImage>().unwrap();
    let mut px = [0u8; 4];
    cpu.get(1, 2, &mut px);
    // (2 * 4 + 1) * 4 = 36
    assert_eq!(px, [36, 37, 38, 39]);
}

#[test]
#[should_panic(expected = "raw write size mismatch")]
fn test_raw_write_wrong_size() {
    let mut img = CpuImageFactory.create(2, 2, 1, DataType::Uint8);
    img.write_raw(&[0; 3]);
}

#[test]
fn test_release_keeps_host_image_usable() {
    let mut img = CpuImageFactory.create(2, 1, 1, DataType::Uint8);
    img.write_raw(&[4, 5]);
    img.release();
    assert_eq!(img.read_raw().wait(), vec![4, 5]);
}

#[test]
fn test_float_channel_roundtrip() {
    let mut img = CpuImage::new(3, 3, 4, DataType::Float32);
    let value = 0.1234_f32;
    img.set_channel(1, 1, 2, &value.to_ne_bytes());
    let mut out = [0u8; 4];
    img.get_channel(1, 1, 2, &mut out);
    assert_relative_eq!(f32::from_ne_bytes(out), value);
    img.get_channel(1, 1, 1, &mut out);
    assert_relative_eq!(f32::from_ne_bytes(out), 0.0);
}

#[test]
fn test_image_border_both_axes() {
    let img = CpuImage::new(4, 3, 1, DataType::Uint8);

    let (mut x, mut y) = (-1, 1);
    assert!(img.apply_border(&mut x, &mut y, Border::Repeat));
    assert_eq!((x, y), (0, 1));

    let (mut x, mut y) = (5, -2);
    assert!(img.apply_border(&mut x, &mut y, Border::Wrap));
    assert_eq!((x, y), (1, 1));

    let (mut x, mut y) = (2, 3);
    assert!(img.apply_border(&mut x, &mut y, Border::Mirror));
    assert_eq!((x, y), (2, 1));

    // Valid x, invalid y: the pixel has no sample.
    let (mut x, mut y) = (1, 7);
    assert!(!img.apply_border(&mut x, &mut y, Border::Zero));
}

#[test]
fn test_sync_processor_resolves_immediately() {
    let processor: Arc<dyn Processor> = Arc::new(SyncProcessor);
    let fut = processor.enqueue(|| vec![1u8, 2, 3]);
    assert!(fut.is_resolved());
    assert_eq!(fut.wait(), vec![1, 2, 3]);
}

#[test]
fn test_thread_pool_runs_every_job_once() {
    let pool = ThreadPoolProcessor::new(ProcessorConfig {
        threads: 3,
        thread_name: "test-worker".into(),
    })
    .unwrap();
    assert_eq!(pool.threads(), 3);
    let processor: Arc<dyn Processor> = Arc::new(pool);

    let counter = Arc::new(AtomicUsize::new(0));
    let futures: Vec<_> = (0..32)
        .map(|i| {
            let counter = counter.clone();
            processor.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                i * 2
            })
        })
        .collect();

    let results: Vec<usize> = futures.into_iter().map(|f| f.wait()).collect();
    assert_eq!(results, (0..32).map(|i| i * 2).collect::<Vec<_>>());
    assert_eq!(counter.load(Ordering::SeqCst), 32);
}

#[test]
fn test_thread_pool_names_workers() {
    let pool = ThreadPoolProcessor::new(ProcessorConfig {
        threads: 1,
        thread_name: "named".into(),
    })
    .unwrap();
    let processor: Arc<dyn Processor> = Arc::new(pool);
    let name = processor
        .enqueue(|| std::thread::current().name().map(str::to_owned))
        .wait();
    assert_eq!(name.as_deref(), Some("named-0"));
}
