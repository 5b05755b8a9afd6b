//! Sampler tests against the text exposition
//!
//! Devices are in-memory fixtures; attribution comes from a stub allocation
//! source. Output is checked by encoding the registry as Prometheus text.

#[cfg(test)]
mod exposition_tests {
    use crate::collector::*;
    use crate::device::{
        CoreFrequency, CoreUtilization, Device, DeviceFile, ErrorCounters, PerformanceCounter,
        RawDeviceInfo, StaticDevice, Temperature,
    };
    use crate::error::{CollectError, DeviceError, RefreshError};
    use crate::kubernetes::{
        AllocationSource, KubeResourcesMapper, MapperConfig, ResourceBinding, ResourceView,
    };
    use crate::models::Workload;
    use async_trait::async_trait;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::sync::Arc;

    struct FixedSource(Vec<ResourceBinding>);

    #[async_trait]
    impl AllocationSource for FixedSource {
        async fn list_allocations(&self) -> Result<Vec<ResourceBinding>, RefreshError> {
            Ok(self.0.clone())
        }
    }

    fn factory() -> Arc<MetricFactory> {
        Arc::new(MetricFactory::new("node-a", "2024.1.0"))
    }

    fn npu(uuid: &str, name: &str) -> StaticDevice {
        StaticDevice {
            info: RawDeviceInfo {
                uuid: uuid.to_string(),
                arch: "rngd".to_string(),
                name: name.to_string(),
                bdf: "0000:17:00.0".to_string(),
                firmware_version: "1.2.0".to_string(),
                pert_version: "0.9.1".to_string(),
            },
            files: vec![
                DeviceFile {
                    path: format!("/dev/rngd/{}pe0-3", name),
                    cores: vec![0, 1, 2, 3],
                },
                DeviceFile {
                    path: format!("/dev/rngd/{}pe4-7", name),
                    cores: vec![4, 5, 6, 7],
                },
            ],
            liveness: Some(true),
            power: Some(41.5),
            temperature: Some(Temperature {
                ambient: 35.0,
                soc_peak: 39.5,
            }),
            errors: Some(ErrorCounters {
                pcie_post_error: 2,
                device_error: 5,
                ..ErrorCounters::default()
            }),
            core_utilization: Some(
                (0..8)
                    .map(|core| CoreUtilization {
                        core,
                        pe_usage_percentage: f64::from(core) * 10.0,
                    })
                    .collect(),
            ),
            core_frequency: Some(
                (0..8)
                    .map(|core| CoreFrequency {
                        core,
                        frequency: 2000,
                    })
                    .collect(),
            ),
            performance_counters: Some(
                (0..8)
                    .map(|core| PerformanceCounter {
                        core,
                        task_execution_cycle: 100,
                        cycle_count: 1000,
                    })
                    .collect(),
            ),
        }
    }

    fn devices(list: Vec<StaticDevice>) -> Vec<Arc<dyn Device>> {
        list.into_iter()
            .map(|d| Arc::new(d) as Arc<dyn Device>)
            .collect()
    }

    fn render(registry: &Registry) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn series<'a>(text: &'a str, metric: &str) -> Vec<&'a str> {
        let prefix = format!("{}{{", metric);
        text.lines().filter(|line| line.starts_with(&prefix)).collect()
    }

    async fn partitioned_view() -> ResourceView {
        let bindings = vec![
            ResourceBinding {
                workload: Workload::new("team-a", "pod-a", "main"),
                resource_name: "furiosa.ai/rngd".to_string(),
                device_ids: vec!["u1_cores_0-3".to_string()],
            },
            ResourceBinding {
                workload: Workload::new("team-b", "pod-b", "main"),
                resource_name: "furiosa.ai/rngd".to_string(),
                device_ids: vec!["u1_cores_4-7".to_string()],
            },
        ];
        let mapper = KubeResourcesMapper::new(MapperConfig::default(), Arc::new(FixedSource(bindings)));
        mapper.refresh().await.unwrap();
        mapper.snapshot()
    }

    #[test]
    fn test_unallocated_liveness_has_no_attribution_labels() {
        let registry = Registry::new();
        let collector = LivenessCollector::new(factory()).unwrap();
        collector.register(&registry).unwrap();

        let errors = collector.collect(&devices(vec![npu("u1", "npu0")]), &ResourceView::Disabled);
        assert!(errors.is_empty());

        let text = render(&registry);
        let lines = series(&text, "furiosa_npu_alive");
        assert_eq!(lines.len(), 1);

        let line = lines[0];
        assert!(line.contains(r#"uuid="u1""#));
        assert!(line.contains(r#"core="0-7""#));
        assert!(line.contains(r#"arch="rngd""#));
        assert!(line.contains(r#"device="npu0""#));
        assert!(line.contains(r#"hostname="node-a""#));
        assert!(!line.contains("namespace="));
        assert!(!line.contains("pod="));
        assert!(!line.contains("container="));
        assert!(line.ends_with(" 1"));
    }

    #[test]
    fn test_failing_device_is_skipped() {
        let registry = Registry::new();
        let collector = LivenessCollector::new(factory()).unwrap();
        collector.register(&registry).unwrap();

        let mut broken = npu("u2", "npu1");
        broken.liveness = None;
        let mut coreless = npu("u3", "npu2");
        coreless.files.clear();

        let errors = collector.collect(
            &devices(vec![broken, npu("u1", "npu0"), coreless]),
            &ResourceView::Disabled,
        );

        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors[0],
            CollectError::Device {
                collector: "liveness",
                source: DeviceError::Unavailable { .. }
            }
        ));
        assert!(matches!(
            &errors[1],
            CollectError::Device {
                source: DeviceError::NoCores { .. },
                ..
            }
        ));

        let text = render(&registry);
        let lines = series(&text, "furiosa_npu_alive");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(r#"uuid="u1""#));
    }

    #[test]
    fn test_removed_device_series_disappears() {
        let registry = Registry::new();
        let collector = PowerCollector::new(factory()).unwrap();
        collector.register(&registry).unwrap();

        collector.collect(
            &devices(vec![npu("u1", "npu0"), npu("u2", "npu1")]),
            &ResourceView::Disabled,
        );
        assert_eq!(series(&render(&registry), "furiosa_npu_hw_power").len(), 2);

        collector.collect(&devices(vec![npu("u1", "npu0")]), &ResourceView::Disabled);
        let text = render(&registry);
        let lines = series(&text, "furiosa_npu_hw_power");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(r#"label="rms""#));
        assert!(lines[0].ends_with(" 41.5"));
    }

    #[test]
    fn test_temperature_uses_label_discriminator() {
        let registry = Registry::new();
        let collector = TemperatureCollector::new(factory()).unwrap();
        collector.register(&registry).unwrap();

        collector.collect(&devices(vec![npu("u1", "npu0")]), &ResourceView::Disabled);

        let text = render(&registry);
        let lines = series(&text, "furiosa_npu_hw_temperature");
        assert_eq!(lines.len(), 2);
        assert!(lines
            .iter()
            .any(|l| l.contains(r#"label="ambient""#) && l.ends_with(" 35")));
        assert!(lines
            .iter()
            .any(|l| l.contains(r#"label="peak""#) && l.ends_with(" 39.5")));
    }

    #[test]
    fn test_error_classes() {
        let registry = Registry::new();
        let collector = ErrorCollector::new(factory()).unwrap();
        collector.register(&registry).unwrap();

        collector.collect(&devices(vec![npu("u1", "npu0")]), &ResourceView::Disabled);

        let text = render(&registry);
        let lines = series(&text, "furiosa_npu_error");
        assert_eq!(lines.len(), 9);
        assert!(lines
            .iter()
            .any(|l| l.contains(r#"label="pcie_post_error""#) && l.ends_with(" 2")));
        assert!(lines
            .iter()
            .any(|l| l.contains(r#"label="device_error""#) && l.ends_with(" 5")));
        assert!(lines
            .iter()
            .any(|l| l.contains(r#"label="axi_doorbell_done""#) && l.ends_with(" 0")));
    }

    #[tokio::test]
    async fn test_partitioned_device_publishes_card_and_slices() {
        let registry = Registry::new();
        let collector = PowerCollector::new(factory()).unwrap();
        collector.register(&registry).unwrap();

        let view = partitioned_view().await;
        collector.collect(&devices(vec![npu("u1", "npu0")]), &view);

        let text = render(&registry);
        let lines = series(&text, "furiosa_npu_hw_power");
        assert_eq!(lines.len(), 3);

        let card: Vec<_> = lines.iter().filter(|l| !l.contains("pod=")).collect();
        assert_eq!(card.len(), 1);
        assert!(card[0].contains(r#"core="0-7""#));

        assert!(lines
            .iter()
            .any(|l| l.contains(r#"pod="pod-a""#) && l.contains(r#"core="0-3""#)));
        assert!(lines.iter().any(|l| l.contains(r#"pod="pod-b""#)
            && l.contains(r#"core="4-7""#)
            && l.contains(r#"namespace="team-b""#)));
    }

    #[tokio::test]
    async fn test_core_utilization_is_attributed_per_core() {
        let registry = Registry::new();
        let collector = CoreUtilizationCollector::new(factory()).unwrap();
        collector.register(&registry).unwrap();

        let view = partitioned_view().await;
        collector.collect(&devices(vec![npu("u1", "npu0")]), &view);

        let text = render(&registry);
        let lines = series(&text, "furiosa_npu_core_utilization");
        assert_eq!(lines.len(), 8);

        let core_2 = lines
            .iter()
            .find(|l| l.contains(r#"core="2""#))
            .unwrap();
        assert!(core_2.contains(r#"pod="pod-a""#));
        assert!(core_2.ends_with(" 20"));

        let core_6 = lines
            .iter()
            .find(|l| l.contains(r#"core="6""#))
            .unwrap();
        assert!(core_6.contains(r#"pod="pod-b""#));
    }

    #[test]
    fn test_frequency_per_core() {
        let registry = Registry::new();
        let collector = FrequencyCollector::new(factory()).unwrap();
        collector.register(&registry).unwrap();

        collector.collect(&devices(vec![npu("u1", "npu0")]), &ResourceView::Disabled);

        let text = render(&registry);
        let lines = series(&text, "furiosa_npu_core_frequency");
        assert_eq!(lines.len(), 8);
        assert!(lines.iter().all(|l| l.ends_with(" 2000")));
    }

    #[test]
    fn test_cycle_counters_expose_absolute_values() {
        let registry = Registry::new();
        let collector = CycleCollector::new(factory()).unwrap();
        collector.register(&registry).unwrap();

        let mut device = npu("u1", "npu0");
        collector.collect(&devices(vec![device.clone()]), &ResourceView::Disabled);

        device.performance_counters = Some(vec![PerformanceCounter {
            core: 0,
            task_execution_cycle: 250,
            cycle_count: 4000,
        }]);
        collector.collect(&devices(vec![device]), &ResourceView::Disabled);

        let text = render(&registry);
        assert!(text.contains("# TYPE furiosa_npu_task_execution_cycle counter"));
        assert!(text.contains("# TYPE furiosa_npu_total_cycle_count counter"));

        let task = series(&text, "furiosa_npu_task_execution_cycle");
        let total = series(&text, "furiosa_npu_total_cycle_count");
        assert_eq!(task.len(), 1);
        assert!(task[0].contains(r#"core="0""#));
        assert!(task[0].ends_with(" 250"));
        assert!(total[0].ends_with(" 4000"));
    }

    #[test]
    fn test_each_family_registers_once() {
        let registry = Registry::new();
        let collector = LivenessCollector::new(factory()).unwrap();

        collector.register(&registry).unwrap();
        assert!(collector.register(&registry).is_err());
    }
}
