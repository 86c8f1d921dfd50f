//! State-machine transition enforcement (spec §4.5).
//!
//! The transition table itself lives on `InstanceStatus::can_transition_to`
//! (domain::instance) since it's a property of the status enum, not of the
//! store; this module holds tests asserting every edge and non-edge in
//! spec §4.5's graph.

#[cfg(test)]
mod tests {
    use crate::domain::instance::InstanceStatus::*;

    #[test]
    fn every_edge_in_the_spec_graph_is_permitted() {
        let edges = [
            (Creating, Created),
            (Creating, Failed),
            (Created, Starting),
            (Created, Failed),
            (Starting, Running),
            (Starting, Failed),
            (Running, HealthChecking),
            (Running, Stopping),
            (Running, Exited),
            (Running, Failed),
            (HealthChecking, Ready),
            (HealthChecking, Failed),
            (HealthChecking, Stopping),
            (Ready, Stopping),
            (Ready, Exited),
            (Ready, Failed),
            (Stopping, Stopped),
            (Stopping, Failed),
            (Stopped, Starting),
            (Stopped, Terminated),
            (Exited, Starting),
            (Exited, Terminated),
        ];
        for (from, to) in edges {
            assert!(from.can_transition_to(to), "{from} -> {to} should be permitted");
        }
    }

    #[test]
    fn terminated_is_reachable_from_every_non_terminal_state() {
        let states = [
            Creating,
            Created,
            Starting,
            Running,
            HealthChecking,
            Ready,
            Stopping,
            Stopped,
            Failed,
            Exited,
        ];
        for state in states {
            assert!(state.can_transition_to(Terminated));
        }
    }

    #[test]
    fn skipping_stages_is_rejected() {
        assert!(!Creating.can_transition_to(Running));
        assert!(!Created.can_transition_to(Ready));
        assert!(!Starting.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Starting));
        assert!(!Stopped.can_transition_to(Running));
    }
}
