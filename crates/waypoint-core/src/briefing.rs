//! Role briefings rendered via `minijinja`.
//!
//! A briefing is the text handed to the decision oracle alongside the
//! observation: a role-specific system section followed by the actor's
//! position, surroundings, recent messages, and memory. Each role has a
//! built-in template; operators can replace one with
//! [`BriefingRenderer::set_template`] without recompiling the actors.

use minijinja::Environment;
use waypoint_types::Role;

use crate::observation::Observation;

/// Errors raised while loading or rendering a briefing template.
#[derive(Debug, thiserror::Error)]
pub enum BriefingError {
    /// A template failed to compile or render.
    #[error("briefing template error: {0}")]
    Template(String),
}

/// Shared situation section appended to every role template.
const SITUATION: &str = "\
Position: {% if position %}({{ position.x }}, {{ position.y }}){% else %}not placed{% endif %}
Grid size: {{ grid_width }}x{{ grid_height }}
Tick: {{ tick }}

Nearby cells:
{% for n in neighbors %}- {{ n.direction }} ({{ n.x }}, {{ n.y }}): {% if not n.passable %}impassable{% elif n.occupied %}occupied{% else %}free{% endif %}{% if n.structure.type != \"none\" %}, {{ n.structure.type }}{% endif %}
{% else %}- none
{% endfor %}
Recent messages:
{% for m in recent_messages %}- {{ m }}
{% else %}- none
{% endfor %}
Memory:
{% for m in memory %}- {{ m }}
{% else %}- none
{% endfor %}
Capabilities: {{ capabilities | join(\", \") }}

Always respond with a single action.";

const SCOUT_TEMPLATE: &str = "\
You are a scout exploring a grid world. Map the terrain and report what you find.
Actions:
- MOVE <north|south|east|west>
- OBSERVE
- REPORT <findings>
";

const STRATEGIST_TEMPLATE: &str = "\
You are a strategist. Read the scout's reports and decide where the builder should build.
Actions:
- ANALYZE
- SUGGEST_BUILD <x>,<y>
";

const BUILDER_TEMPLATE: &str = "\
You are a builder. Follow the strategist's build orders and construct buildings.
Actions:
- BUILD <x>,<y>
- MOVE <north|south|east|west>
- WAIT
";

/// Renders role briefings from observations.
pub struct BriefingRenderer {
    env: Environment<'static>,
}

impl BriefingRenderer {
    /// A renderer with the built-in role templates.
    ///
    /// # Errors
    ///
    /// Returns [`BriefingError::Template`] if a built-in template fails to
    /// compile.
    pub fn new() -> Result<Self, BriefingError> {
        let mut renderer = Self {
            env: Environment::new(),
        };
        renderer.set_template(Role::Scout, SCOUT_TEMPLATE)?;
        renderer.set_template(Role::Strategist, STRATEGIST_TEMPLATE)?;
        renderer.set_template(Role::Builder, BUILDER_TEMPLATE)?;
        Ok(renderer)
    }

    /// Replace the role-specific section of `role`'s briefing. The shared
    /// situation section is appended automatically.
    ///
    /// # Errors
    ///
    /// Returns [`BriefingError::Template`] if the template does not compile.
    pub fn set_template(&mut self, role: Role, source: &str) -> Result<(), BriefingError> {
        self.env
            .add_template_owned(role.as_str(), format!("{source}\n{SITUATION}"))
            .map_err(|e| {
                BriefingError::Template(format!("failed to add {} template: {e}", role.as_str()))
            })
    }

    /// Render the briefing for the observing actor's role.
    ///
    /// # Errors
    ///
    /// Returns [`BriefingError::Template`] if rendering fails.
    pub fn render(&self, observation: &Observation) -> Result<String, BriefingError> {
        let name = observation.role.as_str();
        self.env
            .get_template(name)
            .map_err(|e| BriefingError::Template(format!("missing {name} template: {e}")))?
            .render(observation)
            .map_err(|e| BriefingError::Template(format!("{name} render failed: {e}")))
    }
}

impl std::fmt::Debug for BriefingRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BriefingRenderer").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use waypoint_types::{AgentId, Coord, Message};
    use waypoint_world::Grid;

    use super::*;

    #[test]
    fn scout_briefing_lists_surroundings() {
        let mut grid = Grid::new(4, 4).unwrap();
        let scout = AgentId::new();
        let other = AgentId::new();
        grid.place_actor(scout, Coord::new(1, 1));
        grid.place_actor(other, Coord::new(2, 1));
        let inbox = vec![Message::new(other, "Area clear")];
        let memory = vec![String::from("Moved east")];
        let obs = Observation::capture(&grid, scout, Role::Scout, 4, &inbox, &memory);

        let text = BriefingRenderer::new().unwrap().render(&obs).unwrap();
        assert!(text.starts_with("You are a scout"));
        assert!(text.contains("Position: (1, 1)"));
        assert!(text.contains("east (2, 1): occupied"));
        assert!(text.contains("- Area clear"));
        assert!(text.contains("- Moved east"));
        assert!(text.contains("exploration, reconnaissance, pathfinding"));
    }

    #[test]
    fn custom_template_replaces_role_section() {
        let grid = Grid::new(2, 2).unwrap();
        let obs = Observation::capture(&grid, AgentId::new(), Role::Builder, 0, &[], &[]);
        let mut renderer = BriefingRenderer::new().unwrap();
        renderer.set_template(Role::Builder, "Build fast.").unwrap();
        let text = renderer.render(&obs).unwrap();
        assert!(text.starts_with("Build fast."));
        assert!(text.contains("Position: not placed"));
    }

    #[test]
    fn broken_template_is_rejected() {
        let mut renderer = BriefingRenderer::new().unwrap();
        let result = renderer.set_template(Role::Scout, "{% for %}");
        assert!(matches!(result, Err(BriefingError::Template(_))));
    }
}
