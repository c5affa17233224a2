//! A connected group of bodies solved together.
//!
//! The world rebuilds islands every step by walking touching contacts and
//! joints. An island integrates its bodies, runs the contact and joint
//! solvers over them and decides whether the whole group may sleep.

use log::trace;
use slotmap::SlotMap;

use crate::common::settings::WorldSettings;
use crate::constraints::Joint;
use crate::integration::{integrate_position, integrate_velocity, Position, SolverData, TimeStep, Velocity};
use crate::objects::{Body, BodyHandle, BodyType, ContactHandle, Fixture, FixtureHandle, JointHandle};
use crate::solver::contact_solver::ContactSolver;
use crate::world::contact::Contact;
use crate::world::contact_manager::Listener;

#[derive(Debug, Default)]
pub(crate) struct Island {
    pub bodies: Vec<BodyHandle>,
    pub contacts: Vec<ContactHandle>,
    pub joints: Vec<JointHandle>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
    contact_solver: ContactSolver,
}

impl Island {
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    /// Adds a body and records its slot in the solver arrays.
    pub fn add_body(&mut self, handle: BodyHandle, body: &mut Body) {
        body.island_index = self.bodies.len();
        self.bodies.push(handle);
    }

    pub fn add_contact(&mut self, handle: ContactHandle) {
        self.contacts.push(handle);
    }

    pub fn add_joint(&mut self, handle: JointHandle) {
        self.joints.push(handle);
    }

    /// Solves one full step for the island. Returns true when the island fell asleep.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &mut self,
        step: &TimeStep,
        settings: &WorldSettings,
        bodies: &mut SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
        contacts: &mut SlotMap<ContactHandle, Contact>,
        joints: &mut SlotMap<JointHandle, Joint>,
        listener: &mut Listener,
    ) -> bool {
        let h = step.dt;

        self.positions.clear();
        self.velocities.clear();
        for &handle in &self.bodies {
            let body = &mut bodies[handle];
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;

            let mut velocity = Velocity {
                v: body.linear_velocity,
                w: body.angular_velocity,
            };
            integrate_velocity(body, &mut velocity, settings.gravity, h);

            self.positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            self.velocities.push(velocity);
        }

        self.contact_solver.init(*step, &self.contacts, contacts, fixtures, bodies);
        self.contact_solver
            .initialize_velocity_constraints(&self.positions, &self.velocities, settings);
        if step.warm_starting {
            self.contact_solver.warm_start(&mut self.velocities);
        }

        let mut data = SolverData {
            step: *step,
            settings,
            positions: &mut self.positions,
            velocities: &mut self.velocities,
        };

        for &handle in &self.joints {
            let joint = &mut joints[handle];
            let (body_a, body_b) = (&bodies[joint.body_a], &bodies[joint.body_b]);
            joint.init_velocity_constraints(&mut data, body_a, body_b);
        }

        for _ in 0..step.velocity_iterations {
            for &handle in &self.joints {
                joints[handle].solve_velocity_constraints(&mut data);
            }
            self.contact_solver.solve_velocity_constraints(data.velocities);
        }

        self.contact_solver.store_impulses(contacts);

        for (position, velocity) in data.positions.iter_mut().zip(data.velocities.iter_mut()) {
            integrate_position(position, velocity, settings, h);
        }

        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_okay = self.contact_solver.solve_position_constraints(data.positions, settings);

            let mut joints_okay = true;
            for &handle in &self.joints {
                let joint_okay = joints[handle].solve_position_constraints(&mut data);
                joints_okay = joints_okay && joint_okay;
            }

            if contacts_okay && joints_okay {
                // Exit early if the position errors are small.
                position_solved = true;
                break;
            }
        }

        self.write_back(bodies);
        self.report(contacts, listener);

        if !settings.allow_sleep {
            return false;
        }

        let mut min_sleep_time = f64::MAX;
        let lin_tol_sqr = settings.linear_sleep_tolerance * settings.linear_sleep_tolerance;
        let ang_tol_sqr = settings.angular_sleep_tolerance * settings.angular_sleep_tolerance;

        for &handle in &self.bodies {
            let body = &mut bodies[handle];
            if body.body_type == BodyType::Static {
                continue;
            }
            if !body.auto_sleep
                || body.angular_velocity * body.angular_velocity > ang_tol_sqr
                || body.linear_velocity.magnitude_squared() > lin_tol_sqr
            {
                body.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                body.sleep_time += h;
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }

        if min_sleep_time >= settings.time_to_sleep && position_solved {
            for &handle in &self.bodies {
                bodies[handle].set_awake(false);
            }
            trace!("island of {} bodies fell asleep", self.bodies.len());
            return true;
        }
        false
    }

    /// Resolves a time of impact sub-step. Only the two TOI bodies are moved
    /// by position correction; the rest of the island acts as fixed geometry.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_toi(
        &mut self,
        sub_step: &TimeStep,
        toi_index_a: usize,
        toi_index_b: usize,
        settings: &WorldSettings,
        bodies: &mut SlotMap<BodyHandle, Body>,
        fixtures: &SlotMap<FixtureHandle, Fixture>,
        contacts: &mut SlotMap<ContactHandle, Contact>,
        listener: &mut Listener,
    ) {
        self.positions.clear();
        self.velocities.clear();
        for &handle in &self.bodies {
            let body = &bodies[handle];
            self.positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            self.velocities.push(Velocity {
                v: body.linear_velocity,
                w: body.angular_velocity,
            });
        }

        self.contact_solver.init(*sub_step, &self.contacts, contacts, fixtures, bodies);

        for _ in 0..sub_step.position_iterations {
            if self
                .contact_solver
                .solve_toi_position_constraints(&mut self.positions, settings, toi_index_a, toi_index_b)
            {
                break;
            }
        }

        // The corrected poses become the start of the remaining sweep.
        for index in [toi_index_a, toi_index_b] {
            let body = &mut bodies[self.bodies[index]];
            body.sweep.c0 = self.positions[index].c;
            body.sweep.a0 = self.positions[index].a;
        }

        self.contact_solver
            .initialize_velocity_constraints(&self.positions, &self.velocities, settings);
        for _ in 0..sub_step.velocity_iterations {
            self.contact_solver.solve_velocity_constraints(&mut self.velocities);
        }

        let h = sub_step.dt;
        for (position, velocity) in self.positions.iter_mut().zip(self.velocities.iter_mut()) {
            integrate_position(position, velocity, settings, h);
        }

        self.write_back(bodies);
        self.report(contacts, listener);
    }

    fn write_back(&self, bodies: &mut SlotMap<BodyHandle, Body>) {
        for (i, &handle) in self.bodies.iter().enumerate() {
            let body = &mut bodies[handle];
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();
        }
    }

    fn report(&self, contacts: &SlotMap<ContactHandle, Contact>, listener: &mut Listener) {
        let Some(listener) = listener.as_mut() else {
            return;
        };
        for (handle, impulse) in self.contact_solver.impulses() {
            if let Some(contact) = contacts.get(handle) {
                listener.post_solve(contact, &impulse);
            }
        }
    }
}
