//! Unit tests for destination resolution against the mock store

#[cfg(test)]
mod tests {
    use crate::error::{ErrorClass, ResolveError};
    use crate::mock::MockObjectStore;
    use crate::resolver::{DestinationResolver, ResolverConfig, DEFAULT_PORT_ANNOTATION};
    use crate::store::{ServicePort, StoreError, StoredObject};
    use crate::ObjectStore;
    use crds::{DestinationSpec, Reference};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tracker::{ChangedObject, ManualClock, ObserverKey, Tracker};

    const LEASE: Duration = Duration::from_secs(600);

    struct Fixture {
        store: MockObjectStore,
        resolver: DestinationResolver,
        enqueued: Arc<Mutex<Vec<ObserverKey>>>,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let store = MockObjectStore::new();
        let clock = ManualClock::new();
        let enqueued = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&enqueued);
        let tracker = Arc::new(Tracker::with_clock(
            LEASE,
            move |key| sink.lock().unwrap().push(key),
            Arc::new(clock.clone()),
        ));
        let resolver = DestinationResolver::new(
            Arc::new(store.clone()),
            tracker,
            ResolverConfig::default(),
        );
        Fixture {
            store,
            resolver,
            enqueued,
            clock,
        }
    }

    fn observer() -> ObserverKey {
        ObserverKey::new("bindings.microscaler.io", "v1alpha1", "SinkBinding", "ns", "binding")
    }

    fn route() -> Reference {
        Reference::named("serving.example.dev", "v1", "Route", "ns", "svc")
    }

    fn service(name: &str) -> Reference {
        Reference::named("", "v1", "Service", "ns", name)
    }

    #[tokio::test]
    async fn test_ref_with_path() {
        let f = fixture();
        f.store.add_addressable(&route(), "http://svc.ns.local");

        let spec = DestinationSpec::from_ref(route()).with_path("/foo");
        let uri = f.resolver.uri_from_destination(&spec, &observer()).await.unwrap();
        assert_eq!(uri, "http://svc.ns.local/foo");
    }

    #[tokio::test]
    async fn test_ref_with_relative_uri() {
        let f = fixture();
        f.store.add_addressable(&route(), "http://svc.ns.local");

        let mut spec = DestinationSpec::from_ref(route());
        spec.uri = Some("/foo".to_string());
        let uri = f.resolver.uri_from_destination(&spec, &observer()).await.unwrap();
        assert_eq!(uri, "http://svc.ns.local/foo");
    }

    #[tokio::test]
    async fn test_relative_uri_replaces_path_and_query() {
        let f = fixture();
        f.store.add_addressable(&route(), "http://svc.ns.local/base/index?old=1");

        let mut spec = DestinationSpec::from_ref(route());
        spec.uri = Some("events?new=2".to_string());
        let uri = f.resolver.uri_from_destination(&spec, &observer()).await.unwrap();
        assert_eq!(uri, "http://svc.ns.local/base/events?new=2");
    }

    #[tokio::test]
    async fn test_relative_uri_then_path() {
        let f = fixture();
        f.store.add_addressable(&route(), "https://svc.ns.local/");

        let mut spec = DestinationSpec::from_ref(route()).with_path("/b");
        spec.uri = Some("/a".to_string());
        let uri = f.resolver.uri_from_destination(&spec, &observer()).await.unwrap();
        assert_eq!(uri, "https://svc.ns.local/a/b");
    }

    #[tokio::test]
    async fn test_absolute_uri_used_directly() {
        let f = fixture();
        let spec = DestinationSpec::from_uri("https://hooks.example.com/in").with_path("/x");
        let uri = f.resolver.uri_from_destination(&spec, &observer()).await.unwrap();
        assert_eq!(uri, "https://hooks.example.com/in/x");
        assert_eq!(f.store.lookups(), 0);
        assert_eq!(f.resolver.tracker().bucket_count(), 0);
    }

    #[tokio::test]
    async fn test_absolute_uri_keeps_trailing_slash() {
        let f = fixture();
        let spec = DestinationSpec::from_uri("https://example.com/");
        let uri = f.resolver.uri_from_destination(&spec, &observer()).await.unwrap();
        assert_eq!(uri, "https://example.com/");
    }

    #[tokio::test]
    async fn test_invalid_destination_touches_nothing() {
        let f = fixture();
        let mut spec = DestinationSpec::from_ref(route());
        spec.uri = Some("http://elsewhere.example.com".to_string());

        let err = f.resolver.uri_from_destination(&spec, &observer()).await.unwrap_err();
        assert!(err.to_string().contains("absolute URI is not allowed"), "{err}");
        assert_eq!(err.class(), ErrorClass::Caller);
        assert_eq!(f.store.lookups(), 0);
        assert_eq!(f.resolver.tracker().bucket_count(), 0);

        let err = f
            .resolver
            .uri_from_destination(&DestinationSpec::default(), &observer())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected at least one"), "{err}");
    }

    #[tokio::test]
    async fn test_not_found_is_transient_and_tracked() {
        let f = fixture();
        let spec = DestinationSpec::from_ref(route());

        let err = f.resolver.uri_from_destination(&spec, &observer()).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
        assert!(err.to_string().contains("not found"));
        assert!(err.is_transient());

        let leases = f.resolver.tracker().leases_for(&route());
        assert_eq!(leases.len(), 1);
        assert_eq!(leases[0].observer, observer());

        // The object appearing re-enqueues the observer.
        f.resolver.tracker().on_changed(&ChangedObject::new(
            "serving.example.dev",
            "v1",
            "Route",
            Some("ns"),
            Some("svc"),
        ));
        assert_eq!(f.enqueued.lock().unwrap().as_slice(), &[observer()]);
    }

    #[tokio::test]
    async fn test_unready_addresses_are_transient() {
        let f = fixture();
        let spec = DestinationSpec::from_ref(route());

        f.store.insert(&route(), StoredObject::Addressable(Default::default()));
        let err = f.resolver.uri_from_destination(&spec, &observer()).await.unwrap_err();
        assert!(matches!(err, ResolveError::AddressNotSet { .. }), "{err}");
        assert!(err.is_transient());

        f.store.insert(
            &route(),
            StoredObject::Addressable(crate::AddressableObject::with_url(None)),
        );
        let err = f.resolver.uri_from_destination(&spec, &observer()).await.unwrap_err();
        assert!(matches!(err, ResolveError::UrlMissing { .. }), "{err}");

        f.store.add_addressable(&route(), "/no-host");
        let err = f.resolver.uri_from_destination(&spec, &observer()).await.unwrap_err();
        assert!(matches!(err, ResolveError::HostMissing { .. }), "{err}");
        assert!(err.is_transient());

        assert_eq!(f.resolver.tracker().leases_for(&route()).len(), 1);
    }

    #[tokio::test]
    async fn test_service_single_port() {
        let f = fixture();
        f.store.add_service(&service("web"), vec![ServicePort::unnamed(8080)], &[]);

        let uri = f
            .resolver
            .uri_from_destination(&DestinationSpec::from_ref(service("web")), &observer())
            .await
            .unwrap();
        assert_eq!(uri, "http://web.ns.svc.cluster.local:8080");
    }

    #[tokio::test]
    async fn test_service_prefers_port_80() {
        let f = fixture();
        f.store.add_service(
            &service("web"),
            vec![ServicePort::unnamed(80), ServicePort::unnamed(8080)],
            &[],
        );

        let uri = f
            .resolver
            .uri_from_destination(&DestinationSpec::from_ref(service("web")).with_path("/e"), &observer())
            .await
            .unwrap();
        assert_eq!(uri, "http://web.ns.svc.cluster.local/e");
    }

    #[tokio::test]
    async fn test_service_ambiguous_ports() {
        let f = fixture();
        f.store.add_service(
            &service("web"),
            vec![ServicePort::unnamed(8080), ServicePort::unnamed(9090)],
            &[],
        );

        let err = f
            .resolver
            .uri_from_destination(&DestinationSpec::from_ref(service("web")), &observer())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ambiguous"), "{err}");
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert_eq!(f.resolver.tracker().leases_for(&service("web")).len(), 1);
    }

    #[tokio::test]
    async fn test_service_annotated_https_port() {
        let f = fixture();
        f.store.add_service(
            &service("web"),
            vec![ServicePort::named("http", 80), ServicePort::named("https", 443)],
            &[(DEFAULT_PORT_ANNOTATION, "https")],
        );

        let uri = f
            .resolver
            .uri_from_destination(&DestinationSpec::from_ref(service("web")), &observer())
            .await
            .unwrap();
        assert_eq!(uri, "https://web.ns.svc.cluster.local");
    }

    #[tokio::test]
    async fn test_custom_cluster_domain() {
        let store = MockObjectStore::new();
        store.add_service(&service("web"), vec![ServicePort::unnamed(80)], &[]);
        let resolver = DestinationResolver::new(
            Arc::new(store),
            Arc::new(Tracker::new(LEASE, |_| {})),
            ResolverConfig {
                cluster_domain: "corp.internal".to_string(),
                ..Default::default()
            },
        );

        let uri = resolver
            .uri_from_destination(&DestinationSpec::from_ref(service("web")), &observer())
            .await
            .unwrap();
        assert_eq!(uri, "http://web.ns.svc.corp.internal");
    }

    #[tokio::test]
    async fn test_address_change_flow() {
        let f = fixture();
        f.store.add_addressable(&route(), "http://v1.ns.local");
        let spec = DestinationSpec::from_ref(route());

        let first = f.resolver.uri_from_destination(&spec, &observer()).await.unwrap();
        assert_eq!(first, "http://v1.ns.local");

        f.store.add_addressable(&route(), "http://v2.ns.local");
        f.resolver.tracker().on_changed(
            &ChangedObject::new("serving.example.dev", "v1", "Route", Some("ns"), Some("svc")),
        );
        assert_eq!(f.enqueued.lock().unwrap().len(), 1);

        let second = f.resolver.uri_from_destination(&spec, &observer()).await.unwrap();
        assert_eq!(second, "http://v2.ns.local");
    }

    #[tokio::test]
    async fn test_lease_lapses_without_reresolve() {
        let f = fixture();
        f.store.add_addressable(&route(), "http://svc.ns.local");
        f.resolver
            .uri_from_destination(&DestinationSpec::from_ref(route()), &observer())
            .await
            .unwrap();

        f.clock.advance(LEASE + Duration::from_secs(1));
        f.resolver.tracker().on_changed(
            &ChangedObject::new("serving.example.dev", "v1", "Route", Some("ns"), Some("svc")),
        );
        assert!(f.enqueued.lock().unwrap().is_empty());
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl ObjectStore for FailingStore {
        async fn get_by_reference(&self, reference: &Reference) -> Result<StoredObject, StoreError> {
            Err(StoreError::Unsupported(reference.canonical_key()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let resolver = DestinationResolver::new(
            Arc::new(FailingStore),
            Arc::new(Tracker::new(LEASE, |_| {})),
            ResolverConfig::default(),
        );
        let err = resolver
            .uri_from_destination(&DestinationSpec::from_ref(route()), &observer())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Store(StoreError::Unsupported(_))));
        assert_eq!(resolver.tracker().leases_for(&route()).len(), 1);
    }

    struct UnservedKindStore;

    #[async_trait::async_trait]
    impl ObjectStore for UnservedKindStore {
        async fn get_by_reference(&self, reference: &Reference) -> Result<StoredObject, StoreError> {
            Err(StoreError::UnknownKind(reference.scope_key()))
        }
    }

    #[tokio::test]
    async fn test_unserved_kind_needs_configuration() {
        let resolver = DestinationResolver::new(
            Arc::new(UnservedKindStore),
            Arc::new(Tracker::new(LEASE, |_| {})),
            ResolverConfig::default(),
        );
        let err = resolver
            .uri_from_destination(&DestinationSpec::from_ref(route()), &observer())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Store(StoreError::UnknownKind(_))));
        assert_eq!(err.class(), ErrorClass::Configuration);
    }
}
