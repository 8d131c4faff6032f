// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 控制服务 (Control server)
/// TCP, 每行一个JSON事件. 每个连接: 读线程处理入站消息, 写线程转发订阅事件
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown as NetShutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::select;
use tracing::{debug, info, warn};

use super::handler::Controller;
use crate::publish::{EventHub, Subscription};
use crate::shutdown::Shutdown;

const ACCEPT_POLL: Duration = Duration::from_millis(100);
const READ_POLL: Duration = Duration::from_millis(500);
const MAX_LINE: usize = 64 * 1024;

pub struct ControlServer {
    listener: TcpListener,
    controller: Arc<Controller>,
    hub: Arc<EventHub>,
    shutdown: Shutdown,
}

impl ControlServer {
    pub fn bind(
        addr: &str,
        controller: Arc<Controller>,
        hub: Arc<EventHub>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).with_context(|| format!("failed to bind {}", addr))?;
        listener
            .set_nonblocking(true)
            .context("failed to configure listener")?;
        Ok(Self {
            listener,
            controller,
            hub,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn spawn(self) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("control-server".into())
            .spawn(move || self.run())
            .context("failed to spawn control server thread")
    }

    /// 接受连接直到取消
    pub fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("🌐 控制服务监听 {}", addr);
        }
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = self.serve(stream, peer) {
                        warn!(%peer, "连接初始化失败: {:#}", e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if self.shutdown.wait(ACCEPT_POLL) {
                        break;
                    }
                }
                Err(e) => {
                    warn!("accept 失败: {}", e);
                    if self.shutdown.wait(ACCEPT_POLL) {
                        break;
                    }
                }
            }
        }
        info!("控制服务退出");
    }

    fn serve(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(READ_POLL))?;
        let writer = stream.try_clone().context("failed to clone stream")?;
        let subscription = self.hub.subscribe();
        info!(%peer, subscriber = subscription.id, "🔌 客户端已连接");

        let controller = Arc::clone(&self.controller);
        let hub = Arc::clone(&self.hub);
        let shutdown = self.shutdown.clone();
        thread::Builder::new()
            .name(format!("control-{}", peer))
            .spawn(move || {
                let id = subscription.id;
                let write_shutdown = shutdown.clone();
                let write_handle = thread::Builder::new()
                    .name(format!("control-tx-{}", peer))
                    .spawn(move || write_loop(writer, subscription, write_shutdown));

                read_loop(stream, &controller, &shutdown, peer);

                // 取消订阅后写线程的接收端断开
                hub.unsubscribe(id);
                match write_handle {
                    Ok(handle) => {
                        let _ = handle.join();
                    }
                    Err(e) => warn!(%peer, "写线程启动失败: {}", e),
                }
                info!(%peer, "客户端已断开");
            })
            .context("failed to spawn connection thread")?;
        Ok(())
    }
}

fn read_loop(stream: TcpStream, controller: &Controller, shutdown: &Shutdown, peer: SocketAddr) {
    let mut reader = BufReader::new(&stream);
    let mut line = Vec::new();
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        // 每次最多读到 MAX_LINE + 1 字节, 超出即断开
        let budget = (MAX_LINE + 1).saturating_sub(line.len()) as u64;
        match reader.by_ref().take(budget).read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) if line.last() != Some(&b'\n') => {
                if line.len() > MAX_LINE {
                    warn!(%peer, "消息过长, 断开连接");
                    break;
                }
            }
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim();
                if !text.is_empty() {
                    debug!(%peer, "收到: {}", text);
                    let _ = controller.handle_line(text);
                }
                line.clear();
            }
            // 超时: 已读内容保留在 line 中
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                debug!(%peer, "读取失败: {}", e);
                break;
            }
        }
    }
    let _ = stream.shutdown(NetShutdown::Both);
}

fn write_loop(mut stream: TcpStream, subscription: Subscription, shutdown: Shutdown) {
    loop {
        let line = select! {
            recv(subscription.rx) -> line => match line {
                Ok(line) => line,
                Err(_) => break,
            },
            recv(shutdown.receiver()) -> _ => break,
        };
        let written = stream
            .write_all(line.as_bytes())
            .and_then(|_| stream.write_all(b"\n"));
        if written.is_err() {
            break;
        }
    }
    let _ = stream.shutdown(NetShutdown::Both);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::OutboundEvent;
    use crate::input::{Backoff, CaptureManager, FrameBuffer, FrameSource, FrameStream};
    use crate::registry::CameraRegistry;
    use crate::shutdown;
    use crate::types::CameraId;
    use anyhow::anyhow;
    use std::io::BufRead;
    use std::time::Instant;

    struct OfflineSource;

    impl FrameSource for OfflineSource {
        fn open(&self, _camera_id: &CameraId) -> Result<Box<dyn FrameStream>> {
            Err(anyhow!("offline"))
        }
    }

    fn start() -> (SocketAddr, Arc<CameraRegistry>, Arc<EventHub>, shutdown::ShutdownTrigger, JoinHandle<()>) {
        let registry = Arc::new(CameraRegistry::new());
        let captures = Arc::new(CaptureManager::new(
            Arc::new(OfflineSource),
            Arc::new(FrameBuffer::new()),
            Backoff::default(),
        ));
        let hub = Arc::new(EventHub::new(16));
        let controller = Arc::new(Controller::new(registry.clone(), captures, hub.clone()));
        let (trigger, shutdown) = shutdown::channel();
        let server = ControlServer::bind("127.0.0.1:0", controller, hub.clone(), shutdown).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.spawn().unwrap();
        (addr, registry, hub, trigger, handle)
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn set_tripwire_over_tcp_is_echoed_to_clients() {
        let (addr, registry, hub, trigger, handle) = start();
        let mut client = TcpStream::connect(addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        wait_for(|| hub.subscriber_count() == 1);

        // 分两次写入同一行
        client
            .write_all(br#"{"event":"set_tripwire","data":{"camera_ip":"cam","#)
            .unwrap();
        thread::sleep(Duration::from_millis(20));
        client
            .write_all(b"\"tripwire\":{\"x1\":0,\"y1\":240,\"x2\":640,\"y2\":240}}}\n")
            .unwrap();

        let mut reader = BufReader::new(client.try_clone().unwrap());
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let event: OutboundEvent = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(event.name(), "tripwire_update");
        assert!(registry
            .snapshot(&CameraId::new("cam"))
            .unwrap()
            .tripwire
            .is_some());

        // 非法行不影响连接
        client.write_all(b"garbage\n").unwrap();
        client
            .write_all(br#"{"event":"set_tripwire","data":{"camera_ip":"cam","tripwire":null}}"#)
            .unwrap();
        client.write_all(b"\n").unwrap();
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert!(line.contains("\"tripwire\":null"), "{}", line);

        drop(reader);
        drop(client);
        wait_for(|| hub.subscriber_count() == 0);
        trigger.trigger();
        handle.join().unwrap();
    }

    #[test]
    fn oversized_line_drops_the_connection() {
        let (addr, _registry, hub, trigger, handle) = start();
        let mut client = TcpStream::connect(addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        wait_for(|| hub.subscriber_count() == 1);

        // 一次写入, 中间不停顿, 没有换行
        let _ = client.write_all(&vec![b'a'; MAX_LINE * 4]);
        let _ = client.write_all(
            b"{\"event\":\"set_tripwire\",\"data\":{\"camera_ip\":\"cam\",\"tripwire\":null}}\n",
        );

        let mut buf = [0u8; 256];
        match client.read(&mut buf) {
            Ok(n) => assert_eq!(n, 0, "connection still served"),
            Err(e) => assert!(
                !matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
                "connection still open: {}",
                e
            ),
        }
        wait_for(|| hub.subscriber_count() == 0);

        trigger.trigger();
        handle.join().unwrap();
    }

    #[test]
    fn server_stops_on_shutdown() {
        let (_addr, _registry, _hub, trigger, handle) = start();
        trigger.trigger();
        handle.join().unwrap();
    }

    #[test]
    fn cloned_trigger_fired_from_another_thread_stops_server() {
        let (_addr, _registry, _hub, trigger, handle) = start();
        let on_signal = trigger.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            on_signal.trigger();
        })
        .join()
        .unwrap();
        handle.join().unwrap();
        assert!(trigger.is_triggered());
    }
}
