#![no_std]
#![no_main]

use panic_probe as _;
use defmt_rtt as _;

#[rtic::app(device = stm32f4xx_hal::pac, peripherals = true)]
mod app {
    use stm32f4xx_hal::{
        prelude::*,
        gpio::{Output, Pin},
        pac,
        spi::{Spi, Mode as SpiMode, Phase, Polarity},
        timer::{CounterHz, Event},
        serial::{Serial, Config as SerialConfig, Event as SerialEvent},
        rcc::Config,
    };

    use heapless::Vec;
    use core::fmt::Write as _;

    use bramble_node_runtime::flash::{ExternalFlash, FlashError, PAGE_SIZE, SECTOR_SIZE};
    use bramble_node_runtime::heartbeat_client::HeartbeatStatus;
    use bramble_node_runtime::pmu_link::{PmuError, PmuTransport};
    use bramble_node_runtime::radio::{RadioError, RadioPort};
    use bramble_node_runtime::runtime::{NodeRuntime, NodeRuntimeConfig, NodeState};
    use bramble_protocol::{Address, SensorDataRecord};

    const NETWORK_ID: u8 = 18;
    const LORA_FREQ: u32 = 915;
    const THIS_DEVICE_ID: u64 = 0x0001_0203_0405_0607;

    /// AT-command LoRa transceiver over UART4, the same co-processor setup
    /// the pre-mesh firmware used: `AT+SEND=<addr>,<len>,<payload>` to
    /// transmit, unsolicited `+RCV=<addr>,<len>,<payload>,<rssi>,<snr>` lines
    /// pushed in from the RX interrupt.
    pub struct AtCommandRadio {
        uart: Serial<pac::UART4>,
        rx_queue: Vec<Vec<u8, 280>, 4>,
        last_rssi: i16,
    }

    impl AtCommandRadio {
        fn send_at(&mut self, cmd: &str) {
            for byte in cmd.as_bytes() {
                let _ = nb::block!(self.uart.write(*byte));
            }
            let _ = nb::block!(self.uart.write(b'\r'));
            let _ = nb::block!(self.uart.write(b'\n'));
            cortex_m::asm::delay(8_400_000);
        }

        /// Parse one `+RCV=<addr>,<len>,<payload>,<rssi>,<snr>` line and
        /// push the decoded frame bytes onto the queue.
        fn ingest_line(&mut self, line: &[u8]) {
            if line.len() < 6 || &line[0..5] != b"+RCV=" {
                return;
            }
            let rest = &line[5..];
            let mut fields = rest.splitn(2, |&b| b == b',');
            let Some(_addr) = fields.next() else { return };
            let Some(tail) = fields.next() else { return };
            let mut tail_fields = tail.splitn(2, |&b| b == b',');
            let Some(len_bytes) = tail_fields.next() else { return };
            let Some(after_len) = tail_fields.next() else { return };
            let Ok(len_str) = core::str::from_utf8(len_bytes) else { return };
            let Ok(payload_len) = len_str.parse::<usize>() else { return };
            if after_len.len() < payload_len {
                return;
            }
            let payload = &after_len[..payload_len];
            let mut frame: Vec<u8, 280> = Vec::new();
            if frame.extend_from_slice(payload).is_err() {
                return;
            }

            // Trailing `,<rssi>,<snr>` after the binary payload.
            if let Ok(trailer) = core::str::from_utf8(&after_len[payload_len..]) {
                let mut parts = trailer.trim_matches(',').split(',');
                if let Some(rssi_str) = parts.next() {
                    if let Ok(rssi) = rssi_str.trim().parse::<i16>() {
                        self.last_rssi = rssi;
                    }
                }
            }

            if self.rx_queue.push(frame).is_err() {
                defmt::warn!("radio rx queue full, dropping frame");
            }
        }
    }

    impl RadioPort for AtCommandRadio {
        fn send(&mut self, frame: &[u8]) -> Result<(), RadioError> {
            let mut prefix: heapless::String<24> = heapless::String::new();
            let _ = core::write!(prefix, "AT+SEND=0,{},", frame.len());
            for b in prefix.as_bytes() {
                let _ = nb::block!(self.uart.write(*b)).map_err(|_| RadioError::NotConnected);
            }
            for b in frame {
                let _ = nb::block!(self.uart.write(*b)).map_err(|_| RadioError::SendFailed);
            }
            let _ = nb::block!(self.uart.write(b'\r'));
            let _ = nb::block!(self.uart.write(b'\n'));
            Ok(())
        }

        fn try_receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>, RadioError> {
            let Some(frame) = self.rx_queue.pop() else {
                return Ok(None);
            };
            if frame.len() > buf.len() {
                return Err(RadioError::BufferTooSmall);
            }
            buf[..frame.len()].copy_from_slice(&frame);
            Ok(Some(frame.len()))
        }

        fn rssi(&self) -> i16 {
            self.last_rssi
        }

        fn sleep(&mut self) -> Result<(), RadioError> {
            self.send_at("AT+MODE=1");
            Ok(())
        }

        fn wake(&mut self) -> Result<(), RadioError> {
            self.send_at("AT+MODE=0");
            Ok(())
        }
    }

    /// Hand-rolled SPI NOR flash driver (JEDEC standard commands: 0x03 read,
    /// 0x06 write-enable, 0x02 page program, 0x20 sector erase). No crate in
    /// the stack covers this narrow a surface, so it's driven directly the
    /// same way the AT-command radio is.
    pub struct SpiNorFlash<SPI, CS> {
        spi: SPI,
        cs: CS,
        capacity: u32,
    }

    impl<SPI, CS> SpiNorFlash<SPI, CS>
    where
        SPI: embedded_hal::spi::SpiBus,
        CS: embedded_hal::digital::OutputPin,
    {
        fn with_cs<R>(&mut self, f: impl FnOnce(&mut SPI) -> R) -> R {
            let _ = self.cs.set_low();
            let r = f(&mut self.spi);
            let _ = self.cs.set_high();
            r
        }

        fn write_enable(&mut self) {
            self.with_cs(|spi| {
                let _ = spi.write(&[0x06]);
            });
        }
    }

    impl<SPI, CS> ExternalFlash for SpiNorFlash<SPI, CS>
    where
        SPI: embedded_hal::spi::SpiBus,
        CS: embedded_hal::digital::OutputPin,
    {
        fn capacity_bytes(&self) -> u32 {
            self.capacity
        }

        fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
            if addr + buf.len() as u32 > self.capacity {
                return Err(FlashError::OutOfRange);
            }
            let cmd = [0x03, (addr >> 16) as u8, (addr >> 8) as u8, addr as u8];
            self.with_cs(|spi| {
                let _ = spi.write(&cmd);
                let _ = spi.read(buf);
            });
            Ok(())
        }

        fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
            if data.len() > PAGE_SIZE || (addr % PAGE_SIZE as u32) + data.len() as u32 > PAGE_SIZE as u32 {
                return Err(FlashError::Misaligned);
            }
            if addr + data.len() as u32 > self.capacity {
                return Err(FlashError::OutOfRange);
            }
            self.write_enable();
            let cmd = [0x02, (addr >> 16) as u8, (addr >> 8) as u8, addr as u8];
            self.with_cs(|spi| {
                let _ = spi.write(&cmd);
                let _ = spi.write(data);
            });
            Ok(())
        }

        fn erase_sector(&mut self, addr: u32) -> Result<(), FlashError> {
            if addr % SECTOR_SIZE as u32 != 0 {
                return Err(FlashError::Misaligned);
            }
            if addr >= self.capacity {
                return Err(FlashError::OutOfRange);
            }
            self.write_enable();
            let cmd = [0x20, (addr >> 16) as u8, (addr >> 8) as u8, addr as u8];
            self.with_cs(|spi| {
                let _ = spi.write(&cmd);
            });
            Ok(())
        }
    }

    /// Framed `START(0xAA) len seq cmd data... checksum END(0x55)` link to
    /// the PMU over UART5, a dedicated half-duplex channel separate from
    /// the shared LoRa medium.
    pub struct PmuUart {
        uart: Serial<pac::UART5>,
        rx_buf: Vec<u8, 48>,
    }

    impl PmuTransport for PmuUart {
        fn write(&mut self, bytes: &[u8]) -> Result<(), PmuError> {
            for b in bytes {
                nb::block!(self.uart.write(*b)).map_err(|_| PmuError::Transport)?;
            }
            Ok(())
        }

        fn try_read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, PmuError> {
            while let Ok(byte) = self.uart.read() {
                if self.rx_buf.push(byte).is_err() {
                    self.rx_buf.clear();
                }
            }
            if self.rx_buf.is_empty() {
                return Ok(None);
            }
            let n = self.rx_buf.len().min(buf.len());
            buf[..n].copy_from_slice(&self.rx_buf[..n]);
            self.rx_buf.clear();
            Ok(Some(n))
        }
    }

    type Runtime = NodeRuntime<AtCommandRadio, SpiNorFlash<Spi<pac::SPI1>, Pin<'A', 4, Output>>, PmuUart>;

    #[shared]
    struct Shared {
        runtime: Runtime,
    }

    #[local]
    struct Local {
        led: Pin<'A', 5, Output>,
        tick: CounterHz<pac::TIM2>,
        rx_line: Vec<u8, 280>,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local, init::Monotonics) {
        let dp = cx.device;
        let mut rcc = dp.RCC.freeze(Config::hsi().sysclk(84.MHz()));

        let gpioa = dp.GPIOA.split(&mut rcc);
        let gpiob = dp.GPIOB.split(&mut rcc);
        let gpioc = dp.GPIOC.split(&mut rcc);

        let led = gpioa.pa5.into_push_pull_output();

        let tx = gpioc.pc10.into_alternate();
        let rx = gpioc.pc11.into_alternate();
        let lora_uart = Serial::new(dp.UART4, (tx, rx), SerialConfig::default().baudrate(115_200.bps()), &mut rcc).unwrap();

        defmt::info!("Configuring LoRa radio co-processor");
        let mut radio = AtCommandRadio { uart: lora_uart, rx_queue: Vec::new(), last_rssi: -120 };
        radio.send_at("AT");
        let mut cmd: heapless::String<32> = heapless::String::new();
        let _ = core::write!(cmd, "AT+NETWORKID={}", NETWORK_ID);
        radio.send_at(cmd.as_str());
        cmd.clear();
        let _ = core::write!(cmd, "AT+BAND={}000000", LORA_FREQ);
        radio.send_at(cmd.as_str());
        radio.uart.listen(SerialEvent::RxNotEmpty);

        let sck = gpiob.pb3.into_alternate::<5>();
        let miso = gpiob.pb4.into_alternate();
        let mosi = gpiob.pb5.into_alternate();
        let spi = Spi::new(
            dp.SPI1,
            (sck, miso, mosi),
            SpiMode { polarity: Polarity::IdleLow, phase: Phase::CaptureOnFirstTransition },
            1.MHz(),
            &mut rcc,
        );
        let cs = gpioa.pa4.into_push_pull_output();
        let flash = SpiNorFlash { spi, cs, capacity: 8 * 1024 * 1024 };

        let pmu_tx = gpioc.pc12.into_alternate();
        let pmu_rx = gpioc.pc13.into_alternate();
        let pmu_uart = Serial::new(dp.UART5, (pmu_tx, pmu_rx), SerialConfig::default().baudrate(9_600.bps()), &mut rcc).unwrap();
        let pmu = PmuUart { uart: pmu_uart, rx_buf: Vec::new() };

        let config = NodeRuntimeConfig {
            device_id: THIS_DEVICE_ID,
            ..NodeRuntimeConfig::default()
        };
        let runtime = Runtime::new(radio, flash, pmu, Address::UNREGISTERED, config).expect("flash ring init");

        let mut tick = dp.TIM2.counter_hz(&mut rcc);
        tick.start(10.Hz()).unwrap();
        tick.listen(Event::Update);

        (
            Shared { runtime },
            Local { led, tick, rx_line: Vec::new() },
            init::Monotonics(),
        )
    }

    /// Drives the wake-cycle pipeline once per tick. Real sensor reads are
    /// plugged in at the `ReadingSensor` arm; this firmware's scope stops at
    /// wiring the transport capability traits, so that arm just reports a
    /// sensor fault, which still exercises `DegradedNoSensor` and backlog
    /// drain on whatever a prior wake already wrote to flash.
    #[task(binds = TIM2, shared = [runtime], local = [led, tick])]
    fn tick_handler(mut cx: tick_handler::Context) {
        cx.local.tick.clear_flags(stm32f4xx_hal::timer::Flag::Update);
        cx.local.led.toggle();
        let now_ms: u32 = 0; // TODO: wire a free-running monotonic once one is selected.

        cx.shared.runtime.lock(|rt| {
            while let Ok(Some(_)) = rt.poll_pmu(now_ms) {}
            let _ = rt.poll_tasks(now_ms);

            match rt.state() {
                NodeState::Initializing => {
                    let _ = rt.begin_wake(now_ms);
                }
                NodeState::TimeSynced => {
                    rt.report_sensor_init_result(false);
                }
                NodeState::ReadingSensor => {
                    let _ = rt.report_read_complete(SensorDataRecord::new(now_ms, 0, 0));
                }
                NodeState::CheckingBacklog | NodeState::DegradedNoSensor => {
                    let _ = rt.check_backlog();
                }
                NodeState::Transmitting => {
                    let _ = rt.maybe_register(now_ms);
                    let _ = rt.pump_transmit(now_ms);
                }
                NodeState::Listening => {
                    rt.start_listening(now_ms);
                    let _ = rt.poll_radio(now_ms);
                }
                _ => {}
            }

            if let Ok(Some(msg)) = rt.poll_radio(now_ms) {
                defmt::debug!("unhandled message type {}", msg.header.msg_type.as_u8());
            }
        });
    }

    #[task(binds = UART4, shared = [runtime], local = [rx_line])]
    fn uart4_handler(mut cx: uart4_handler::Context) {
        cx.shared.runtime.lock(|rt| {
            let radio = rt.messenger_mut().radio_mut();
            while let Ok(byte) = radio.uart.read() {
                if cx.local.rx_line.push(byte).is_err() {
                    cx.local.rx_line.clear();
                }
                if byte == b'\n' && cx.local.rx_line.len() >= 2 && cx.local.rx_line[cx.local.rx_line.len() - 2] == b'\r' {
                    radio.ingest_line(cx.local.rx_line.as_slice());
                    cx.local.rx_line.clear();
                }
            }
        });
    }
}
