//! Discovery of remote entities through liveliness tokens.

use std::sync::Arc;
use std::time::Duration;

use zenoh_ros2_sdk::transport::MemoryTransport;
use zenoh_ros2_sdk::{Builder, Result, ZContextBuilder};
use zenoh_ros2_protocol::EntityKind;

#[test]
fn test_remote_entities_come_and_go() -> Result<()> {
    let bus = MemoryTransport::new();
    let observer = ZContextBuilder::default()
        .with_transport(Arc::new(bus.peer()))
        .build()?;
    let remote = ZContextBuilder::default()
        .with_transport(Arc::new(bus.peer()))
        .build()?;

    let node = remote.create_node("talker").with_namespace("/demo").build()?;
    let publisher = node.create_pub("chatter", "std_msgs/msg/String").build()?;
    let server = node
        .create_service("reset", "std_srvs/srv/Empty")
        .build_with_handler(Ok)?;

    let graph = observer.graph();
    assert!(graph.wait_until(Duration::from_millis(100), |data| {
        data.has_node("/demo", "talker") && data.count_publishers("/demo/chatter") == 1
    }));
    assert_eq!(graph.node_names(), [("/demo".to_string(), "talker".to_string())]);
    assert_eq!(
        graph.topic_names_and_types(),
        [("/demo/chatter".to_string(), vec!["std_msgs/msg/String".to_string()])]
    );
    assert_eq!(
        graph.service_names_and_types(),
        [("/demo/reset".to_string(), vec!["std_srvs/srv/Empty".to_string()])]
    );
    assert!(graph.wait_for_service("/demo/reset", Duration::ZERO));

    let endpoints = graph.endpoints_of_node("/demo", "talker");
    assert_eq!(endpoints.len(), 2);
    let remote_pub = &graph.publishers("/demo/chatter")[0];
    assert_eq!(remote_pub.kind, EntityKind::Publisher);
    assert_eq!(remote_pub.node.session_id, remote.session_id());
    assert_eq!(remote_pub.entity_id, publisher.identity().entity_id);

    publisher.close()?;
    assert_eq!(graph.count_publishers("/demo/chatter"), 0);

    drop(publisher);
    drop(server);
    drop(node);
    assert!(graph.nodes().is_empty());
    Ok(())
}

#[test]
fn test_domains_are_isolated() -> Result<()> {
    let bus = MemoryTransport::new();
    let observer = ZContextBuilder::default()
        .with_domain_id(1)
        .with_transport(Arc::new(bus.peer()))
        .build()?;
    let other = ZContextBuilder::default()
        .with_domain_id(2)
        .with_transport(Arc::new(bus.peer()))
        .build()?;

    let _node = other.create_node("elsewhere").build()?;
    assert!(!observer.graph().wait_until(Duration::from_millis(20), |data| {
        data.has_node("/", "elsewhere")
    }));
    assert!(other.graph().wait_until(Duration::ZERO, |data| data.has_node("/", "elsewhere")));
    Ok(())
}
