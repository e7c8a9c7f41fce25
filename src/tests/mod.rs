#[cfg(test)]
mod support;

#[cfg(test)]
mod test_interpolation;

#[cfg(test)]
mod test_smoothing;

#[cfg(test)]
mod test_profile;



#[cfg(test)]
mod test_graph;

#[cfg(test)]
mod test_state;


#[cfg(test)]
mod test_integrator;

#[cfg(test)]
mod test_model;

#[cfg(test)]
mod test_pid;


#[cfg(test)]
mod test_continuous_control;




#[cfg(test)]
mod test_rating_curve;

#[cfg(test)]
mod test_validation;

#[cfg(test)]
mod test_sqlite_io;

#[cfg(test)]
mod test_bmi;
