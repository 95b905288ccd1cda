// Copyright (c) 2024 Graphcore Ltd. All rights reserved.

//! The rasterizer.
//!
//! The rasterizer receives commands from the Command Processor and drives its
//! five stages:
//!
//! ```text
//!   triangles -> Setup -> Traversal -> Hierarchical Z -> Fragment FIFO -> Interpolator -> fragments
//! ```
//!
//! Each stage has its own command and state signals. The rasterizer forwards
//! `RESET`, `DRAW` and `END` to all stages and register writes only to the
//! stages that use the register. A draw ends once every stage reports `END`
//! on the same cycle. A Z buffer clear only involves Hierarchical Z.
//!
//! The stages are owned by the rasterizer and clocked by it, so only the
//! rasterizer and the components outside it are registered with the engine.
//!
//! # Ports
//!
//! The outside world talks to the rasterizer through the [RasterizerIo]
//! returned when it is built:
//!  - `command_tx` / `state_rx`: the Command Processor side of the protocol.
//!  - `triangle_request_rx` / `triangle_tx`: the triangle producer side.
//!  - `fragment_rx`: interpolated stamps.
//!  - `shader`: the shader pool side when setup is done on the shaders.

use std::cell::RefCell;
use std::rc::Rc;

use raster_emulator::emulator::RasterizerEmulator;
use raster_engine::signal::{InSignal, OutSignal, signal};
use raster_engine::sim_fatal;
use raster_engine::traits::Clocked;
use raster_engine::types::{Cycle, SimError, SimResult};
use raster_track::entity::Entity;
use raster_track::{debug, info, trace};

use crate::config::RasterizerConfig;
use crate::fragment_fifo::{FragmentFifo, FragmentFifoPorts};
use crate::hierarchical_z::{HierarchicalZ, HierarchicalZPorts};
use crate::interpolator::{Interpolator, InterpolatorPorts};
use crate::registers::{Child, RegisterFile, fan_out, validate};
use crate::shader_pool::ShaderPoolPorts;
use crate::stage::{
    Stage, StageLink, prime_state, stage_signals, unexpected_command, unsupported_command,
};
use crate::statistics::CommandStatistics;
use crate::triangle_setup::{SetupPorts, ShaderPorts, TriangleSetup};
use crate::triangle_traversal::{TraversalPorts, TriangleTraversal};
use crate::types::{
    CommandKind, PrimitiveAssemblyRequest, RasterizerCommand, RasterizerState,
    RasterizerStateInfo, Stamp, TriangleSetupInput,
};

/// Flow control states are always sampled on the next cycle.
const FLOW_LATENCY: Cycle = 1;

/// The signal ends that connect the rasterizer to the rest of the GPU.
pub struct RasterizerIo {
    pub command_tx: OutSignal<RasterizerCommand>,
    pub state_rx: InSignal<RasterizerStateInfo>,
    pub triangle_request_rx: InSignal<PrimitiveAssemblyRequest>,
    pub triangle_tx: OutSignal<TriangleSetupInput>,
    pub fragment_rx: InSignal<Stamp>,
    pub shader: Option<ShaderPoolPorts>,
}

struct ChildLinks {
    setup: StageLink,
    traversal: StageLink,
    hz: StageLink,
    interpolator: StageLink,
    ffifo: StageLink,
}

impl ChildLinks {
    fn get(&self, child: Child) -> &StageLink {
        match child {
            Child::Setup => &self.setup,
            Child::Traversal => &self.traversal,
            Child::HierarchicalZ => &self.hz,
            Child::Interpolator => &self.interpolator,
            Child::FragmentFifo => &self.ffifo,
        }
    }
}

pub struct Rasterizer {
    pub entity: Rc<Entity>,
    command_rx: InSignal<RasterizerCommand>,
    state_tx: OutSignal<RasterizerStateInfo>,
    links: ChildLinks,
    emulator: Rc<RefCell<RasterizerEmulator>>,

    setup: TriangleSetup,
    traversal: TriangleTraversal,
    hz: HierarchicalZ,
    ffifo: FragmentFifo,
    interpolator: Interpolator,

    state: RasterizerState,
    child_states: [RasterizerState; 5],
    registers: RegisterFile,
    last_command: Option<RasterizerCommand>,
    commands: CommandStatistics,

    last_progress: u64,
    last_progress_cycle: Cycle,
}

impl Rasterizer {
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &RasterizerConfig,
    ) -> Result<(Self, RasterizerIo), SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        config.validate(&entity)?;

        let (command_tx, command_rx) = signal(&entity, "command", 1, config.command_latency);
        let (state_tx, state_rx) = signal(&entity, "state", 1, config.state_latency);
        prime_state(&state_tx, RasterizerStateInfo::new(RasterizerState::Reset));

        let (triangle_request_tx, triangle_request_rx) =
            signal(&entity, "triangle_request", 1, config.triangle_request_latency);
        let (triangle_tx, triangle_rx) = signal(
            &entity,
            "triangle_input",
            config.triangles_cycle,
            config.triangle_input_latency,
        );
        let (setup_request_tx, setup_request_rx) =
            signal(&entity, "setup_request", 1, config.setup_request_latency);
        let (setup_output_tx, setup_output_rx) = signal(
            &entity,
            "setup_output",
            config.triangles_cycle,
            config.setup_output_latency,
        );
        let (traversal_stamp_tx, traversal_stamp_rx) =
            signal(&entity, "traversal_stamps", config.stamps_cycle, config.stamp_latency);
        let (hz_flow_tx, hz_flow_rx) = signal(&entity, "hz_flow", 1, FLOW_LATENCY);
        let (hz_stamp_tx, hz_stamp_rx) =
            signal(&entity, "hz_stamps", config.stamps_cycle, config.stamp_latency);
        let (ffifo_flow_tx, ffifo_flow_rx) = signal(&entity, "ffifo_flow", 1, FLOW_LATENCY);
        let (ffifo_stamp_tx, ffifo_stamp_rx) =
            signal(&entity, "ffifo_stamps", config.stamps_cycle, config.stamp_latency);
        let (fragment_tx, fragment_rx) =
            signal(&entity, "fragments", config.stamps_cycle, config.fragment_latency);

        let (setup_shader, pool_shader) = if config.shader_setup {
            let (input_tx, input_rx) = signal(
                &entity,
                "shader_input",
                config.setup_units,
                config.shader_signal_latency,
            );
            let (output_tx, output_rx) = signal(
                &entity,
                "shader_output",
                config.triangle_shader_queue_size,
                config.shader_signal_latency,
            );
            let (shader_state_tx, shader_state_rx) =
                signal(&entity, "shader_state", 1, config.shader_signal_latency);
            (
                Some(ShaderPorts {
                    input_tx,
                    output_rx,
                    state_rx: shader_state_rx,
                }),
                Some(ShaderPoolPorts {
                    input_rx,
                    output_tx,
                    state_tx: shader_state_tx,
                }),
            )
        } else {
            (None, None)
        };

        let latencies = (config.command_latency, config.state_latency);
        let (setup_link, setup_ports) = stage_signals(&entity, "setup", latencies.0, latencies.1);
        let (traversal_link, traversal_ports) =
            stage_signals(&entity, "traversal", latencies.0, latencies.1);
        let (hz_link, hz_ports) = stage_signals(&entity, "hz", latencies.0, latencies.1);
        let (interpolator_link, interpolator_ports) =
            stage_signals(&entity, "interpolator", latencies.0, latencies.1);
        let (ffifo_link, ffifo_ports) = stage_signals(&entity, "ffifo", latencies.0, latencies.1);

        let emulator = Rc::new(RefCell::new(RasterizerEmulator::new(&entity)));

        let setup = TriangleSetup::new(
            &entity,
            config.into(),
            SetupPorts {
                stage: setup_ports,
                input_request_tx: triangle_request_tx,
                input_rx: triangle_rx,
                output_request_rx: setup_request_rx,
                output_tx: setup_output_tx,
                shader: setup_shader,
            },
            emulator.clone(),
        )?;
        let traversal = TriangleTraversal::new(
            &entity,
            config.into(),
            TraversalPorts {
                stage: traversal_ports,
                setup_request_tx,
                setup_rx: setup_output_rx,
                stamp_tx: traversal_stamp_tx,
                hz_state_rx: hz_flow_rx,
            },
            emulator.clone(),
        )?;
        let hz = HierarchicalZ::new(
            &entity,
            config.into(),
            HierarchicalZPorts {
                stage: hz_ports,
                stamp_rx: traversal_stamp_rx,
                state_tx: hz_flow_tx,
                stamp_tx: hz_stamp_tx,
                ffifo_state_rx: ffifo_flow_rx,
            },
        )?;
        let ffifo = FragmentFifo::new(
            &entity,
            config.into(),
            FragmentFifoPorts {
                stage: ffifo_ports,
                stamp_rx: hz_stamp_rx,
                state_tx: ffifo_flow_tx,
                stamp_tx: ffifo_stamp_tx,
            },
        )?;
        let interpolator = Interpolator::new(
            &entity,
            config.into(),
            InterpolatorPorts {
                stage: interpolator_ports,
                stamp_rx: ffifo_stamp_rx,
                fragment_tx,
            },
        )?;

        let rasterizer = Self {
            entity,
            command_rx,
            state_tx,
            links: ChildLinks {
                setup: setup_link,
                traversal: traversal_link,
                hz: hz_link,
                interpolator: interpolator_link,
                ffifo: ffifo_link,
            },
            emulator,
            setup,
            traversal,
            hz,
            ffifo,
            interpolator,
            state: RasterizerState::Reset,
            child_states: [RasterizerState::Reset; 5],
            registers: RegisterFile::default(),
            last_command: None,
            commands: CommandStatistics::default(),
            last_progress: 0,
            last_progress_cycle: 0,
        };
        let io = RasterizerIo {
            command_tx,
            state_rx,
            triangle_request_rx,
            triangle_tx,
            fragment_rx,
            shader: pool_shader,
        };
        Ok((rasterizer, io))
    }

    #[must_use]
    pub fn emulator(&self) -> Rc<RefCell<RasterizerEmulator>> {
        self.emulator.clone()
    }

    /// The register values as last written by the Command Processor.
    #[must_use]
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    #[must_use]
    pub fn setup(&self) -> &TriangleSetup {
        &self.setup
    }

    #[must_use]
    pub fn traversal(&self) -> &TriangleTraversal {
        &self.traversal
    }

    #[must_use]
    pub fn hierarchical_z(&self) -> &HierarchicalZ {
        &self.hz
    }

    #[must_use]
    pub fn fragment_fifo(&self) -> &FragmentFifo {
        &self.ffifo
    }

    #[must_use]
    pub fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    /// Access a stage through the queries common to all stages.
    #[must_use]
    pub fn child(&self, child: Child) -> &dyn Stage {
        match child {
            Child::Setup => &self.setup,
            Child::Traversal => &self.traversal,
            Child::HierarchicalZ => &self.hz,
            Child::Interpolator => &self.interpolator,
            Child::FragmentFifo => &self.ffifo,
        }
    }

    /// Returns whether the rasterizer is drawing but no stage has made any
    /// progress for `threshold` cycles.
    #[must_use]
    pub fn detect_stall(&self, cycle: Cycle, threshold: Cycle) -> bool {
        self.state == RasterizerState::Drawing
            && cycle.saturating_sub(self.last_progress_cycle) >= threshold
    }

    /// A description of every stage, used to diagnose a stall.
    #[must_use]
    pub fn stall_report(&self) -> String {
        let mut report = format!(
            "{}: {} (last progress on cycle {})",
            self.entity, self.state, self.last_progress_cycle
        );
        for child in Child::ALL {
            report.push_str(&format!("\n  {child}: {}", self.child(child).state_report()));
        }
        report
    }

    /// Forward the last command received to `child`.
    fn send(&self, child: Child, cycle: Cycle) -> SimResult {
        let Some(command) = &self.last_command else {
            return sim_fatal!(self.entity, "send" ; "no command to forward to {child}");
        };
        trace!(self.entity ; "send {command} to {child}");
        self.links
            .get(child)
            .command_tx
            .write(cycle, command.forward(&self.entity))
    }

    fn broadcast(&self, cycle: Cycle) -> SimResult {
        for child in Child::ALL {
            self.send(child, cycle)?;
        }
        Ok(())
    }

    fn process_command(&mut self, command: RasterizerCommand, cycle: Cycle) -> SimResult {
        self.commands.record(&command.kind);
        debug!(self.entity ; "{command} in {} state", self.state);
        let kind = command.kind.clone();
        self.last_command = Some(command);
        let state = self.state;

        self.state = match (&kind, state) {
            (CommandKind::Reset, RasterizerState::Drawing) => {
                return unexpected_command(&self.entity, &kind, state);
            }
            (CommandKind::Reset, _) => {
                self.registers.reset();
                self.broadcast(cycle)?;
                RasterizerState::Ready
            }
            (CommandKind::Draw, RasterizerState::Ready) => {
                self.broadcast(cycle)?;
                RasterizerState::Drawing
            }
            (CommandKind::End, RasterizerState::End) => {
                self.broadcast(cycle)?;
                RasterizerState::Ready
            }
            (CommandKind::End, RasterizerState::ClearEnd) => {
                self.send(Child::HierarchicalZ, cycle)?;
                RasterizerState::Ready
            }
            (CommandKind::ClearZStencilBuffer, RasterizerState::Ready) => {
                self.send(Child::HierarchicalZ, cycle)?;
                RasterizerState::Clear
            }
            (
                CommandKind::RegWrite {
                    register,
                    subreg,
                    value,
                },
                RasterizerState::Ready,
            ) => {
                if let Err(msg) = validate(*register, *subreg, value) {
                    return sim_fatal!(self.entity, "process_register_write" ; "{msg}");
                }
                let Some(children) = fan_out(*register) else {
                    return sim_fatal!(self.entity, "process_register_write" ;
                        "Unsupported Rasterizer register {register}");
                };
                self.registers.write(*register, *subreg, *value);
                for child in children {
                    self.send(*child, cycle)?;
                }
                RasterizerState::Ready
            }
            (CommandKind::RegRead { .. }, _) => {
                return unsupported_command(&self.entity, &kind);
            }
            (kind, state) => return unexpected_command(&self.entity, kind, state),
        };
        Ok(())
    }

    fn read_child_states(&mut self, cycle: Cycle) -> SimResult {
        for child in Child::ALL {
            let Some(info) = self.links.get(child).state_rx.read(cycle) else {
                return sim_fatal!(self.entity, "clock" ; "Missing state signal from {child}");
            };
            self.child_states[child.index()] = info.state;
        }
        Ok(())
    }

    /// The state `child` last reported over its state signal.
    fn reported_state(&self, child: Child) -> RasterizerState {
        self.child_states[child.index()]
    }

    fn update_progress(&mut self, cycle: Cycle) {
        let progress = self.progress();
        if progress != self.last_progress {
            self.last_progress = progress;
            self.last_progress_cycle = cycle;
        }
    }
}

impl Clocked for Rasterizer {
    fn clock(&mut self, cycle: Cycle) -> SimResult {
        if self.state == RasterizerState::Reset {
            self.registers.reset();
            self.state = RasterizerState::Ready;
        } else if let Some(command) = self.command_rx.read(cycle) {
            self.process_command(command, cycle)?;
        }

        self.setup.clock(cycle)?;
        self.traversal.clock(cycle)?;
        self.hz.clock(cycle)?;
        self.ffifo.clock(cycle)?;
        self.interpolator.clock(cycle)?;

        self.read_child_states(cycle)?;
        match self.state {
            RasterizerState::Drawing => {
                if self.child_states.iter().all(|s| *s == RasterizerState::End) {
                    info!(self.entity ; "draw finished on cycle {cycle}");
                    self.state = RasterizerState::End;
                }
            }
            RasterizerState::Clear => {
                if self.reported_state(Child::HierarchicalZ) == RasterizerState::ClearEnd {
                    info!(self.entity ; "clear finished on cycle {cycle}");
                    self.state = RasterizerState::ClearEnd;
                }
            }
            _ => {}
        }

        self.update_progress(cycle);
        self.state_tx
            .write(cycle, RasterizerStateInfo::new(self.state))
    }
}

impl Stage for Rasterizer {
    fn state(&self) -> RasterizerState {
        self.state
    }

    /// The rasterizer state followed by the current state of every stage.
    /// A stage whose last reported state differs is shown with it, as in
    /// `setup READY (reported END)`.
    fn state_report(&self) -> String {
        let children: Vec<String> = Child::ALL
            .iter()
            .map(|child| {
                let state = self.child(*child).state();
                let reported = self.reported_state(*child);
                if state == reported {
                    format!("{child} {state}")
                } else {
                    format!("{child} {state} (reported {reported})")
                }
            })
            .collect();
        format!("{} | {}", self.state, children.join(", "))
    }

    /// The sum of the progress of every stage and the commands received.
    fn progress(&self) -> u64 {
        Child::ALL
            .iter()
            .map(|child| self.child(*child).progress())
            .sum::<u64>()
            + self.commands.total()
    }

    fn command_statistics(&self) -> &CommandStatistics {
        &self.commands
    }
}
