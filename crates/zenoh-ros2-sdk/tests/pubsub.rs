//! Publish/subscribe between two sessions sharing an in-process bus.

use std::sync::Arc;
use std::time::Duration;

use zenoh_ros2_sdk::transport::{MemoryTransport, Transport, TransportSample};
use zenoh_ros2_sdk::{Builder, Error, QosProfile, Result, WireMessage, ZContext, ZContextBuilder};

const STRING_KE: &str =
    "0/chatter/std_msgs::msg::dds_::String_/RIHS01_df668c740482bbd48fb39d76a70dfd4bd59db1288021743503259e948f6b1a18";

fn peers() -> Result<(ZContext, ZContext)> {
    let bus = MemoryTransport::new();
    let a = ZContextBuilder::default()
        .with_domain_id(0)
        .with_transport(Arc::new(bus.peer()))
        .build()?;
    let b = ZContextBuilder::default()
        .with_domain_id(0)
        .with_transport(Arc::new(bus.peer()))
        .build()?;
    Ok((a, b))
}

#[test]
fn test_hello_world_across_sessions() -> Result<()> {
    let (talker_ctx, listener_ctx) = peers()?;
    let talker = talker_ctx.create_node("talker").build()?;
    let listener = listener_ctx.create_node("listener").build()?;

    let publisher = talker.create_pub("/chatter", "std_msgs/msg/String").build()?;
    let subscriber = listener.create_sub("chatter", "std_msgs/msg/String").build()?;
    assert_eq!(publisher.key_expr(), STRING_KE);
    assert_eq!(subscriber.key_expr(), STRING_KE);

    let (tx, raw) = flume::unbounded::<TransportSample>();
    let _raw = listener_ctx.transport().declare_subscriber(
        STRING_KE,
        Arc::new(move |sample| {
            let _ = tx.send(sample);
        }),
    )?;

    publisher.publish(&WireMessage::new().with("data", "Hello World!"))?;

    let sample = raw.try_recv().expect("raw sample");
    let mut expected = vec![0x00, 0x01, 0x00, 0x00, 0x0d, 0x00, 0x00, 0x00];
    expected.extend_from_slice(b"Hello World!\0");
    assert_eq!(sample.payload, expected);

    let received = subscriber
        .recv_timeout(Duration::from_millis(100))?
        .expect("message");
    assert_eq!(received.message.get("data").and_then(|v| v.as_str()), Some("Hello World!"));
    let attachment = received.attachment.expect("attachment");
    assert_eq!(attachment.sequence_number, 0);
    assert_eq!(attachment.source_gid, publisher.gid());
    Ok(())
}

#[test]
fn test_custom_type_with_definition() -> Result<()> {
    let (a, b) = peers()?;
    let node_a = a.create_node("pose_source").with_namespace("/robot").build()?;
    let node_b = b.create_node("pose_sink").with_namespace("/robot").build()?;

    let definition = "float64 x\nfloat64 y\nfloat64 theta\n";
    let publisher = node_a
        .create_pub("pose", "demo_msgs/msg/Pose2D")
        .with_definition(definition)
        .build()?;
    let subscriber = node_b
        .create_sub("/robot/pose", "demo_msgs/msg/Pose2D")
        .with_definition(definition)
        .build()?;
    assert_eq!(publisher.topic(), "/robot/pose");
    assert_eq!(publisher.key_expr(), subscriber.key_expr());

    let pose = WireMessage::new()
        .with("x", 1.5f64)
        .with("y", -2.0f64)
        .with("theta", 0.25f64);
    publisher.publish(&pose)?;
    publisher.publish(&pose)?;

    let first = subscriber.try_recv()?.expect("first");
    let second = subscriber.try_recv()?.expect("second");
    assert_eq!(first.message, pose);
    assert_eq!(first.attachment.map(|a| a.sequence_number), Some(0));
    assert_eq!(second.attachment.map(|a| a.sequence_number), Some(1));
    assert!(subscriber.try_recv()?.is_none());
    Ok(())
}

#[test]
fn test_callback_subscriber_has_no_queue() -> Result<()> {
    let (a, b) = peers()?;
    let talker = a.create_node("talker").build()?;
    let listener = b.create_node("listener").build()?;

    let (tx, rx) = flume::unbounded();
    let subscriber = listener
        .create_sub("/count", "std_msgs/msg/Int32")
        .with_definition("int32 data\n")
        .build_with_callback(move |received| {
            let _ = tx.send(received.message);
        })?;
    let publisher = talker
        .create_pub("/count", "std_msgs/msg/Int32")
        .with_definition("int32 data\n")
        .build()?;

    for i in 0..3 {
        publisher.publish(&WireMessage::new().with("data", i as i32))?;
    }
    let values: Vec<i32> = rx
        .try_iter()
        .filter_map(|m| m.get("data").and_then(|v| v.as_i32()))
        .collect();
    assert_eq!(values, [0, 1, 2]);
    assert!(matches!(subscriber.try_recv(), Err(Error::NoQueue)));
    Ok(())
}

#[test]
fn test_keep_last_depth_drops_oldest() -> Result<()> {
    let (a, b) = peers()?;
    let talker = a.create_node("talker").build()?;
    let listener = b.create_node("listener").build()?;
    let subscriber = listener
        .create_sub("/chatter", "std_msgs/msg/String")
        .with_qos(QosProfile::default().with_history(zenoh_ros2_sdk::QosHistory::KeepLast(1)))
        .build()?;
    let publisher = talker.create_pub("/chatter", "std_msgs/msg/String").build()?;

    for text in ["one", "two", "three"] {
        publisher.publish(&WireMessage::new().with("data", text))?;
    }
    let latest = subscriber.try_recv()?.expect("latest");
    assert_eq!(latest.message.get("data").and_then(|v| v.as_str()), Some("three"));
    assert!(subscriber.try_recv()?.is_none());
    Ok(())
}

#[test]
fn test_closed_publisher_and_context() -> Result<()> {
    let (a, _b) = peers()?;
    let node = a.create_node("talker").build()?;
    let publisher = node.create_pub("/chatter", "std_msgs/msg/String").build()?;
    publisher.close()?;
    publisher.close()?;
    assert!(matches!(
        publisher.publish(&WireMessage::new().with("data", "late")),
        Err(Error::Closed(_))
    ));

    a.shutdown()?;
    a.shutdown()?;
    assert!(matches!(a.create_node("late").build(), Err(Error::Closed(_))));
    Ok(())
}
